pub mod artifact;
pub mod config;
pub mod engine;
pub mod job;
pub mod metrics;
pub mod session;
pub mod testing;
pub mod validator;

pub use artifact::{Artifact, ArtifactError, ArtifactPresenter};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LoggingConfig,
};
pub use engine::{
    Engine, EngineBinaries, EngineConfig, EngineError, EngineGateway, FfmpegEngine, GatewayConfig,
    GatewayState,
};
pub use job::{build_job, Compression, JobDescription, JobError, Options, OutputFormat, Resolution};
pub use session::{
    ControllerError, Session, SessionController, SessionError, SessionErrorKind, SessionStep,
};
pub use validator::{validate, InputFile, ValidFile, ValidationError};
