//! Canonical casing for Windows SDK headers
//!
//! MinGW ships the SDK headers in lowercase. These never live in the checked
//! out tree, so `IncludeCaseRule` cannot know about them.

use super::include_case::include_regex;
use super::{rewrite_file, Change, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use regex::Captures;
use std::path::Path;

/// Headers commonly written with leading capitals in MSVC code
const KNOWN_HEADERS: &[&str] = &[
    "windows.h",
    "winsock2.h",
    "ws2tcpip.h",
    "mswsock.h",
    "shlobj.h",
    "shlwapi.h",
    "shellapi.h",
    "tlhelp32.h",
    "wininet.h",
    "winhttp.h",
    "psapi.h",
    "dbghelp.h",
    "commctrl.h",
    "commdlg.h",
    "wincrypt.h",
    "iphlpapi.h",
    "wtsapi32.h",
    "lm.h",
    "ntsecapi.h",
    "setupapi.h",
    "sddl.h",
    "accctrl.h",
    "aclapi.h",
    "userenv.h",
    "taskschd.h",
    "wbemidl.h",
    "objbase.h",
    "oleauto.h",
    "versionhelpers.h",
    "rpc.h",
    "winternl.h",
    "winsvc.h",
    "winuser.h",
    "winbase.h",
    "windowsx.h",
    "richedit.h",
    "uxtheme.h",
    "dwmapi.h",
    "mmsystem.h",
    "strsafe.h",
    "lmcons.h",
    "winioctl.h",
    "objidl.h",
    "shobjidl.h",
    "propvarutil.h",
    "d3d11.h",
    "dxgi.h",
];

pub struct KnownHeaderRule;

impl TransformRule for KnownHeaderRule {
    fn name(&self) -> &'static str {
        "known_headers"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_native_code(path)
    }

    fn apply(&self, path: &Path, _ctx: &mut TreeContext) -> Result<Change, TransformError> {
        rewrite_file(self.name(), path, |text| Some(canonicalize_known_headers(text)))
    }
}

fn canonical_name(name: &str) -> Option<&'static str> {
    KNOWN_HEADERS
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(name))
}

/// Rewrites bare includes of known SDK headers to their lowercase form
pub fn canonicalize_known_headers(text: &str) -> String {
    include_regex()
        .replace_all(text, |caps: &Captures| match canonical_name(&caps[3]) {
            Some(canonical) => format!("{}{}{}{}", &caps[1], &caps[2], canonical, &caps[4]),
            None => caps[0].to_string(),
        })
        .into_owned()
}
