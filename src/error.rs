//! Typed errors for the frame boundary and the actuator seam.

/// A detector frame that breaks the input contract. Such frames are rejected,
/// never repaired.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("finger state must have 5 entries, got {0}")]
    FingerCount(usize),

    #[error("landmark set must be empty or have 21 entries, got {0}")]
    LandmarkCount(usize),

    #[error("landmark at position {index} carries id {id}")]
    LandmarkOrder { index: usize, id: u32 },

    #[error("landmark {id} has non-finite coordinates")]
    NonFinite { id: u32 },

    #[error("frame size must be positive, got {width}x{height}")]
    FrameSize { width: u32, height: u32 },

    #[error("undecodable frame: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    /// The target refused a coordinate outside the screen.
    #[error("cursor target ({x}, {y}) is outside the {width}x{height} screen")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    #[error("input device error: {0}")]
    Device(String),
}
