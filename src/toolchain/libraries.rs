//! Windows import-library names mapped to their MinGW-w64 counterparts

use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// `(windows name, mingw name)`; `None` means MinGW has no equivalent
const LIBRARY_TABLE: &[(&str, Option<&str>)] = &[
    // core
    ("kernel32", Some("kernel32")),
    ("user32", Some("user32")),
    ("gdi32", Some("gdi32")),
    ("ntdll", Some("ntdll")),
    // networking
    ("ws2_32", Some("ws2_32")),
    ("wsock32", Some("wsock32")),
    ("iphlpapi", Some("iphlpapi")),
    ("winhttp", Some("winhttp")),
    ("wininet", Some("wininet")),
    ("mswsock", Some("mswsock")),
    ("dnsapi", Some("dnsapi")),
    ("fwpuclnt", Some("fwpuclnt")),
    ("rasapi32", Some("rasapi32")),
    ("httpapi", Some("httpapi")),
    ("urlmon", Some("urlmon")),
    // security and crypto
    ("secur32", Some("secur32")),
    ("crypt32", Some("crypt32")),
    ("bcrypt", Some("bcrypt")),
    ("ncrypt", Some("ncrypt")),
    ("advapi32", Some("advapi32")),
    ("wintrust", Some("wintrust")),
    ("cryptui", Some("cryptui")),
    ("cryptnet", Some("cryptnet")),
    ("schannel", Some("schannel")),
    ("sspicli", Some("sspicli")),
    ("authz", Some("authz")),
    ("credui", Some("credui")),
    ("wevtapi", Some("wevtapi")),
    // shell and UI
    ("shell32", Some("shell32")),
    ("shlwapi", Some("shlwapi")),
    ("comctl32", Some("comctl32")),
    ("comdlg32", Some("comdlg32")),
    ("uxtheme", Some("uxtheme")),
    ("dwmapi", Some("dwmapi")),
    ("htmlhelp", Some("htmlhelp")),
    // COM and RPC
    ("ole32", Some("ole32")),
    ("oleaut32", Some("oleaut32")),
    ("uuid", Some("uuid")),
    ("combase", Some("combase")),
    ("propsys", Some("propsys")),
    ("rpcrt4", Some("rpcrt4")),
    ("rpcns4", Some("rpcns4")),
    ("comsvcs", Some("comsvcs")),
    ("runtimeobject", Some("runtimeobject")),
    // system services
    ("psapi", Some("psapi")),
    ("dbghelp", Some("dbghelp")),
    ("dbgeng", Some("dbgeng")),
    ("imagehlp", Some("imagehlp")),
    ("version", Some("version")),
    ("wtsapi32", Some("wtsapi32")),
    ("userenv", Some("userenv")),
    ("powrprof", Some("powrprof")),
    ("setupapi", Some("setupapi")),
    ("cfgmgr32", Some("cfgmgr32")),
    ("newdev", Some("newdev")),
    ("mpr", Some("mpr")),
    ("netapi32", Some("netapi32")),
    ("winspool", Some("winspool")),
    ("imm32", Some("imm32")),
    ("pdh", Some("pdh")),
    ("virtdisk", Some("virtdisk")),
    ("wbemuuid", Some("wbemuuid")),
    ("taskschd", Some("taskschd")),
    ("wmi", Some("wmi")),
    ("activeds", Some("activeds")),
    ("adsiid", Some("adsiid")),
    ("cabinet", Some("cabinet")),
    ("bits", Some("bits")),
    ("synchronization", Some("synchronization")),
    ("normaliz", Some("normaliz")),
    ("sensorsapi", Some("sensorsapi")),
    ("portabledeviceguids", Some("portabledeviceguids")),
    ("hid", Some("hid")),
    ("bthprops", Some("bthprops")),
    ("bluetoothapis", Some("bluetoothapis")),
    ("odbc32", Some("odbc32")),
    ("odbccp32", Some("odbccp32")),
    // graphics and multimedia
    ("opengl32", Some("opengl32")),
    ("glu32", Some("glu32")),
    ("winmm", Some("winmm")),
    ("msimg32", Some("msimg32")),
    ("d3d9", Some("d3d9")),
    ("d3d11", Some("d3d11")),
    ("d3d12", Some("d3d12")),
    ("dxgi", Some("dxgi")),
    ("dxguid", Some("dxguid")),
    ("d3dcompiler", Some("d3dcompiler_47")),
    ("dinput8", Some("dinput8")),
    ("dsound", Some("dsound")),
    ("dwrite", Some("dwrite")),
    ("d2d1", Some("d2d1")),
    ("mf", Some("mf")),
    ("mfplat", Some("mfplat")),
    ("mfuuid", Some("mfuuid")),
    ("mfreadwrite", Some("mfreadwrite")),
    // C runtimes
    ("msvcrt", Some("msvcrt")),
    ("msvcrtd", Some("msvcrt")),
    ("ucrt", Some("ucrt")),
    ("ucrtd", Some("ucrt")),
    ("vcruntime", None),
    ("vcruntimed", None),
    ("libcmt", None),
    ("libcmtd", None),
    ("libvcruntime", None),
    ("libucrt", None),
    // unavailable
    ("svcctl", None),
    ("windowsapp", None),
    ("windows.data.pdf", None),
    ("ntoskrnl", None),
    ("atl", None),
    ("atls", None),
    ("atlsd", None),
    ("mfc", None),
    ("mfcs", None),
    ("nafxcw", None),
    // pthreads
    ("pthread", Some("pthread")),
    ("pthreadgc2", Some("pthread")),
];

/// Linked into every native target regardless of what the manifest lists
pub const DEFAULT_LIBRARIES: &[&str] = &[
    "kernel32", "user32", "gdi32", "advapi32", "shell32", "ole32", "oleaut32", "uuid", "ws2_32",
    "crypt32", "secur32", "rpcrt4", "ntdll", "shlwapi", "version", "psapi", "comdlg32", "comctl32",
];

fn lookup() -> &'static HashMap<&'static str, Option<&'static str>> {
    static LOOKUP: OnceLock<HashMap<&'static str, Option<&'static str>>> = OnceLock::new();
    LOOKUP.get_or_init(|| LIBRARY_TABLE.iter().copied().collect())
}

/// Normalized lookup key: basename, lowercase, without `.lib`
fn library_key(name: &str) -> String {
    let base = name
        .trim()
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    base.strip_suffix(".lib").map(str::to_string).unwrap_or(base)
}

/// How one Windows library name resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryMapping {
    Mapped(&'static str),
    Unavailable,
    Unknown,
}

pub fn map_library(name: &str) -> LibraryMapping {
    match lookup().get(library_key(name).as_str()) {
        Some(Some(mingw)) => LibraryMapping::Mapped(mingw),
        Some(None) => LibraryMapping::Unavailable,
        None => LibraryMapping::Unknown,
    }
}

/// Maps a manifest's library list, dropping unavailable and unknown names
///
/// Unknown names are usually import libraries of sibling projects; those are
/// linked from the artifact store instead.
pub fn map_libraries(names: &[String]) -> Vec<String> {
    let mut mapped: Vec<String> = Vec::new();
    for name in names {
        match map_library(name) {
            LibraryMapping::Mapped(lib) => {
                if !mapped.iter().any(|m| m == lib) {
                    mapped.push(lib.to_string());
                }
            }
            LibraryMapping::Unavailable => {
                debug!(library = %name, "Library has no MinGW equivalent, dropping");
            }
            LibraryMapping::Unknown => {
                debug!(library = %name, "Unknown library, dropping");
            }
        }
    }
    mapped
}

/// Mapped manifest libraries followed by the default set, deduplicated
pub fn link_libraries(names: &[String]) -> Vec<String> {
    let mut libs = map_libraries(names);
    for default in DEFAULT_LIBRARIES {
        if !libs.iter().any(|l| l == default) {
            libs.push(default.to_string());
        }
    }
    libs
}
