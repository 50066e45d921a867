use colored::*;
use lanscope_core::resolver;

use crate::terminal::{colors, print};

pub fn info() -> anyhow::Result<()> {
    let ctx = resolver::resolve()?;

    print::header("network context");
    print::aligned_line("Interface", ctx.interface().unwrap_or("-"));
    print::aligned_line(
        "Address",
        ctx.local_addr().to_string().color(colors::IPV4_ADDR),
    );
    print::aligned_line(
        "Subnet",
        format!(
            "{}/{}",
            ctx.subnet().network().to_string().color(colors::IPV4_ADDR),
            ctx.subnet().prefix().to_string().color(colors::IPV4_PREFIX)
        ),
    );
    match ctx.gateway() {
        Some(gw) => print::aligned_line("Gateway", gw.to_string().color(colors::IPV4_ADDR)),
        None => print::aligned_line("Gateway", "none".color(colors::UNKNOWN)),
    }
    if let Some(mac) = ctx.local_mac() {
        print::aligned_line("MAC", mac.to_string().color(colors::MAC_ADDR));
    }
    print::aligned_line("Hosts", ctx.host_count().to_string());

    Ok(())
}
