//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, UmbraError>`. Construction-time failures (device
//! acquisition, pipeline compilation) are fatal and abort engine init;
//! runtime anomalies inside the frame loop are caught by the render graph
//! and turn the engine into a degraded, non-rendering state instead of
//! propagating.

use thiserror::Error;

/// The main error type for the Umbra engine.
#[derive(Error, Debug)]
pub enum UmbraError {
    // ========================================================================
    // GPU & Rendering Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// The surface is not supported by the selected adapter.
    #[error("Surface configuration failed: {0}")]
    SurfaceConfigFailed(String),

    /// Window system error.
    #[error("Window system error: {0}")]
    WindowError(#[from] raw_window_handle::HandleError),

    /// A render or compute pipeline failed to compile.
    ///
    /// Carries the pass name and the first compiler diagnostic. Every
    /// `error`-severity message is logged with line and column before this
    /// is returned.
    #[error("Pipeline compilation failed in {pass}: {message}")]
    PipelineCompileFailed {
        /// Name of the pass whose pipeline failed.
        pass: &'static str,
        /// First error diagnostic from the shader compiler.
        message: String,
    },

    // ========================================================================
    // Asset Errors
    // ========================================================================
    /// The requested asset was not found or failed to decode.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// A model was loaded with malformed vertex or index data.
    #[error("Invalid mesh data in {path}: {reason}")]
    InvalidMeshData {
        /// Asset path of the offending model.
        path: String,
        /// What made the data unusable.
        reason: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A settings patch could not be deserialized into the typed tree.
    #[error("Settings error: {0}")]
    SettingsError(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Alias for `Result<T, UmbraError>`.
pub type Result<T> = std::result::Result<T, UmbraError>;
