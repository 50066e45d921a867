use std::sync::OnceLock;

use lanscope_common::vendors::VendorRepository;
use lanscope_common::warn;
use mac_oui::Oui;
use pnet::util::MacAddr;

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("Vendor lookups disabled, OUI database failed to load: {e}");
                None
            }
        })
        .as_ref()
}

/// Vendor lookups against the OUI database bundled with `mac_oui`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacOuiRepo;

impl VendorRepository for MacOuiRepo {
    fn get_vendor(&self, mac: MacAddr) -> Option<String> {
        let db = oui_db()?;
        match db.lookup_by_mac(&mac.to_string()) {
            Ok(Some(entry)) => Some(entry.company_name.clone()),
            _ => None,
        }
    }

    fn preload(&self) {
        oui_db();
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locally_administered_mac_has_no_vendor() {
        assert_eq!(MacOuiRepo.get_vendor(MacAddr(0x02, 0, 0, 0, 0, 1)), None);
    }

    #[test]
    fn registered_oui_resolves() {
        // 00:00:0C is Cisco's first block.
        let vendor = MacOuiRepo.get_vendor(MacAddr(0x00, 0x00, 0x0c, 0x12, 0x34, 0x56));
        assert!(vendor.is_some_and(|v| v.to_lowercase().contains("cisco")));
    }
}
