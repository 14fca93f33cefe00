//! Regmap Common Library
//!
//! Register map model and code generation for Modbus RTU devices:
//!
//! - [`address`] - Region types and internal/protocol address mapping
//! - [`register`] - Register descriptors, operation and mode
//! - [`device`] - Device configuration and per-context register store
//! - [`optimizer`] - Contiguous range computation
//! - [`codegen`] - C header/source generation
//! - [`import`] - Header parsing back into a configuration
//! - [`persistence`] - JSON/CBOR configuration files
//! - [`session`] - Editing session with slave selection
//! - [`config`] - Tool configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod address;
pub mod codegen;
pub mod config;
pub mod device;
pub mod error;
pub mod fields;
pub mod import;
pub mod optimizer;
pub mod persistence;
pub mod register;
pub mod serialization;
pub mod session;
pub mod settings;

// Re-export commonly used types at the crate root
pub use address::{RegionType, map_address, unmap_address};
pub use codegen::{CodeGenerator, ExportedFiles, GeneratedFiles, generate};
pub use config::{
    ExportConfig, LogFormat, LoggingConfig, ToolConfig, load_config, parse_config,
};
pub use device::{DeviceConfig, MAX_SLAVE_ID, MIN_SLAVE_ID, OwnedRegister, Role};
pub use error::{Error, Result};
pub use fields::{FieldId, mode_enabled, visible_fields};
pub use optimizer::{MAX_RANGE_COUNT, RangeStats, RegisterRange, is_register_valid, optimize};
pub use register::{Access, Mode, Operation, RegisterDescriptor};
pub use serialization::Format;
pub use session::Session;
pub use settings::{Setting, Settings, SettingsGroup};

/// Initialize tracing with the given configuration.
///
/// Output goes to stderr so that command output on stdout stays clean.
/// `RUST_LOG` takes precedence over `config.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
