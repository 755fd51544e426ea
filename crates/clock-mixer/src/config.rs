/// Output stream parameters requested when opening a device.
#[derive(Clone, Debug, Default)]
pub struct OutputConfig {
    /// Requested frames per output callback (the device "update size").
    ///
    /// `None` leaves the choice to the device.
    pub update_frames: Option<u32>,
    /// Requested output sample rate. `None` keeps the device default rate.
    pub target_rate: Option<u32>,
}
