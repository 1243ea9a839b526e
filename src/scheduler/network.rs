//! Host-pushed network state.

/// Coarse network quality as reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkQuality {
    Excellent,
    Good,
    Fair,
    Moderate,
    Poor,
}

impl NetworkQuality {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NetworkQuality::Excellent => "excellent",
            NetworkQuality::Good => "good",
            NetworkQuality::Fair => "fair",
            NetworkQuality::Moderate => "moderate",
            NetworkQuality::Poor => "poor",
        }
    }
}

/// Network state pushed by the host whenever it changes.
///
/// The scheduler only branches on `is_online`; quality and VPN state are
/// carried through to status for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkState {
    /// Whether the network is usable at all.
    pub is_online: bool,
    /// Coarse link quality.
    pub quality: NetworkQuality,
    /// Whether a VPN is active.
    pub vpn_active: bool,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            is_online: true,
            quality: NetworkQuality::Good,
            vpn_active: false,
        }
    }
}

impl NetworkState {
    /// Convenience constructor for an offline state.
    pub fn offline() -> Self {
        Self {
            is_online: false,
            quality: NetworkQuality::Poor,
            vpn_active: false,
        }
    }
}
