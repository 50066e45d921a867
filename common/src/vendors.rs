use pnet::util::MacAddr;

/// Resolves device manufacturers from MAC addresses.
pub trait VendorRepository: Send + Sync {
    /// Returns the vendor name registered for the OUI of `mac_addr`, if known.
    fn get_vendor(&self, mac_addr: MacAddr) -> Option<String>;

    /// Loads the backing data up front. May block, so call it off the async runtime.
    fn preload(&self) {}
}
