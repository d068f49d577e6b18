pub mod settings;

pub use settings::{
    Config,
    AcquisitionConfig,
    TransportKind,
    MeterParameterDefinition,
    FieldbusConfig,
    FramedSocketConfig,
    StorageBackend,
    StorageConfig,
    SqliteConfig,
    JsonFileConfig,
    ApiConfig,
    default_parameter_table,
};
