//! Injection of COM interfaces missing from MinGW's shobjidl.h

use super::iid_tables::guid_initializer;
use super::{rewrite_file, Change, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

struct ComInterface {
    name: &'static str,
    iid: &'static str,
    methods: &'static [&'static str],
}

const INTERFACES: &[ComInterface] = &[
    ComInterface {
        name: "IVirtualDesktopManager",
        iid: "a5cd92ff-29be-454c-8d04-d82879fb3f1b",
        methods: &[
            "IsWindowOnCurrentVirtualDesktop(HWND topLevelWindow, BOOL *onCurrentDesktop)",
            "GetWindowDesktopId(HWND topLevelWindow, GUID *desktopId)",
            "MoveWindowToDesktop(HWND topLevelWindow, REFGUID desktopId)",
        ],
    },
    ComInterface {
        name: "IApplicationActivationManager",
        iid: "2e941141-7f97-4756-ba1d-9decde894a3d",
        methods: &[
            "ActivateApplication(LPCWSTR appUserModelId, LPCWSTR arguments, int options, DWORD *processId)",
            "ActivateForFile(LPCWSTR appUserModelId, IShellItemArray *itemArray, LPCWSTR verb, DWORD *processId)",
            "ActivateForProtocol(LPCWSTR appUserModelId, IShellItemArray *itemArray, DWORD *processId)",
        ],
    },
];

fn anchor_regex() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| {
        Regex::new(r#"(?mi)^[ \t]*#[ \t]*include[ \t]*[<"]shobjidl\.h[">][^\n]*(?:\n|$)"#)
            .expect("valid regex")
    })
}

fn guard_macro(iface: &ComInterface) -> String {
    format!("__wincross_{}_defined", iface.name)
}

fn render(iface: &ComInterface) -> String {
    let guard = guard_macro(iface);
    let mut out = String::new();
    out.push_str(&format!("#ifndef {}\n#define {}\n", guard, guard));
    out.push_str(&format!(
        "#if defined(__cplusplus) && !defined(__{}_INTERFACE_DEFINED__)\n",
        iface.name
    ));
    out.push_str(&format!("MIDL_INTERFACE(\"{}\")\n", iface.iid));
    out.push_str(&format!("{} : public IUnknown\n{{\npublic:\n", iface.name));
    for method in iface.methods {
        out.push_str(&format!(
            "    virtual HRESULT STDMETHODCALLTYPE {} = 0;\n",
            method
        ));
    }
    out.push_str("};\n");
    if let Some(init) = guid_initializer(iface.iid) {
        out.push_str(&format!(
            "#ifdef __CRT_UUID_DECL\n__CRT_UUID_DECL({}, {})\n#endif\n",
            iface.name, init
        ));
    }
    out.push_str(&format!("#endif\n#endif /* {} */\n", guard));
    out
}

fn uses_name(text: &str, name: &str) -> bool {
    text.match_indices(name).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + name.len()..].chars().next();
        let is_ident = |c: Option<char>| c.map_or(false, |c| c.is_alphanumeric() || c == '_');
        !is_ident(before) && !is_ident(after)
    })
}

/// Inserts definitions for used-but-missing interfaces right after the
/// shobjidl.h include; text without that include is returned unchanged
pub fn inject_interfaces(text: &str) -> String {
    let Some(anchor) = anchor_regex().find(text) else {
        return text.to_string();
    };

    let block: String = INTERFACES
        .iter()
        .filter(|iface| uses_name(text, iface.name))
        .filter(|iface| !text.contains(&guard_macro(iface)))
        .map(render)
        .collect();
    if block.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + block.len() + 1);
    out.push_str(&text[..anchor.end()]);
    if !anchor.as_str().ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    out.push_str(&text[anchor.end()..]);
    out
}

pub struct ComInterfaceRule;

impl TransformRule for ComInterfaceRule {
    fn name(&self) -> &'static str {
        "com_interfaces"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_cpp_source(path) || paths::is_header(path)
    }

    fn apply(&self, path: &Path, _ctx: &mut TreeContext) -> Result<Change, TransformError> {
        rewrite_file(self.name(), path, |text| Some(inject_interfaces(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "#include <windows.h>\n#include <shobjidl.h>\n\nIVirtualDesktopManager *vdm = nullptr;\n";

    #[test]
    fn test_injects_after_anchor() {
        let out = inject_interfaces(SOURCE);
        let anchor = out.find("#include <shobjidl.h>\n").unwrap();
        let block = out.find("#ifndef __wincross_IVirtualDesktopManager_defined").unwrap();
        assert_eq!(block, anchor + "#include <shobjidl.h>\n".len());
        assert!(out.contains("MIDL_INTERFACE(\"a5cd92ff-29be-454c-8d04-d82879fb3f1b\")"));
        assert!(out.contains("GetWindowDesktopId(HWND topLevelWindow, GUID *desktopId) = 0;"));
        assert!(!out.contains("IApplicationActivationManager"));
    }

    #[test]
    fn test_guarded_against_double_injection() {
        let once = inject_interfaces(SOURCE);
        assert_eq!(inject_interfaces(&once), once);
    }

    #[test]
    fn test_requires_anchor() {
        let src = "IVirtualDesktopManager *vdm;\n";
        assert_eq!(inject_interfaces(src), src);
    }

    #[test]
    fn test_unused_interfaces_not_injected() {
        let src = "#include <shobjidl.h>\nIVirtualDesktopManagerEx *x;\n";
        assert_eq!(inject_interfaces(src), src);
    }
}
