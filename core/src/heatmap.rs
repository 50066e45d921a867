use lanscope_common::network::device::Device;

pub const DEFAULT_SATURATION: usize = 20;

/// Maps open-port counts onto `[0, 1]` for visualizers.
///
/// Linear up to `saturation` ports, flat at 1.0 from there on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatmapScale {
    saturation: usize,
}

impl Default for HeatmapScale {
    fn default() -> Self {
        Self::new(DEFAULT_SATURATION)
    }
}

impl HeatmapScale {
    /// A saturation of 0 behaves like 1: any open port is full intensity.
    pub fn new(saturation: usize) -> Self {
        Self {
            saturation: saturation.max(1),
        }
    }

    pub fn saturation(&self) -> usize {
        self.saturation
    }

    pub fn intensity(&self, device: &Device) -> f64 {
        self.intensity_for(device.open_ports().len())
    }

    pub fn intensity_for(&self, open_ports: usize) -> f64 {
        (open_ports.min(self.saturation) as f64) / self.saturation as f64
    }
}

pub fn intensity(device: &Device) -> f64 {
    HeatmapScale::default().intensity(device)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
