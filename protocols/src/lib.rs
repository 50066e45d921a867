//! Link-layer frames the discovery engine puts on the wire.

pub mod arp;
pub mod ethernet;

use thiserror::Error;

pub const ETH_HDR_LEN: usize = 14;
pub const ARP_LEN: usize = 28;
/// Shortest Ethernet frame a NIC will send, without the trailing FCS.
pub const MIN_ETH_FRAME_NO_FCS: usize = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too small for an ethernet header")]
    EthernetBuffer,
    #[error("buffer too small for an ARP payload")]
    ArpBuffer,
}
