pub mod capture;
pub mod clock;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod vision;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use capture::{DecodedFrame, FrameCodec, TimestampedFrame};
pub use clock::MonotonicClock;
pub use error::{RelayError, Result};
pub use pipeline::{FrameBuffer, OutputBuffer, VisionWorker, WorkerSettings};
pub use vision::{Detector, Tracker};

/// Config file read when `--config` is not given; absent is fine
pub const DEFAULT_CONFIG_FILE: &str = "vidrelay.toml";

/// Environment variables override the file, e.g. `VIDRELAY__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "VIDRELAY";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub buffer: BufferConfig,
    pub vision: VisionConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Seconds of raw frames retained
    pub max_seconds: u32,
    /// Expected ingest rate; also the worker's tick rate
    pub target_fps: u32,
    /// Annotated frames retained for egress and snapshots
    pub output_capacity: usize,
    pub frame_width: u32,
    pub frame_height: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub confidence_threshold: f32,
    /// Detector class ids to track; empty tracks everything
    pub classes: Vec<u32>,
    pub box_thickness: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Annotated frames at least this old are never sent
    pub staleness_secs: f64,
    pub egress_period_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_seconds: 20,
            target_fps: 10,
            output_capacity: 10,
            frame_width: 640,
            frame_height: 360,
            jpeg_quality: 70,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            classes: vec![0], // person
            box_thickness: 2,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 1.5,
            egress_period_ms: 100,
        }
    }
}

impl SessionConfig {
    pub fn egress_period(&self) -> Duration {
        Duration::from_millis(self.egress_period_ms)
    }
}

impl Config {
    /// Layer the config file (explicit path required, default optional)
    /// under `VIDRELAY__*` environment variables, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let config: Config = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("vision.classes"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(RelayError::InvalidConfig(msg.into()));
        let buffer = &self.buffer;
        if buffer.max_seconds == 0 || buffer.target_fps == 0 {
            return invalid("buffer.max_seconds and buffer.target_fps must be positive");
        }
        if buffer.output_capacity == 0 {
            return invalid("buffer.output_capacity must be positive");
        }
        if buffer.frame_width == 0 || buffer.frame_height == 0 {
            return invalid("buffer frame dimensions must be positive");
        }
        if !(1..=100).contains(&buffer.jpeg_quality) {
            return invalid("buffer.jpeg_quality must be within 1..=100");
        }
        if !(0.0..=1.0).contains(&self.vision.confidence_threshold) {
            return invalid("vision.confidence_threshold must be within 0..=1");
        }
        if !(self.session.staleness_secs > 0.0) {
            return invalid("session.staleness_secs must be positive");
        }
        if self.session.egress_period_ms == 0 {
            return invalid("session.egress_period_ms must be positive");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.bind_address, self.server.port)
            .parse()
            .map_err(|e| RelayError::InvalidConfig(format!("invalid bind address: {e}")))
    }
}

/// Build the buffers, start the vision worker, and serve until `shutdown`
/// resolves. The worker is stopped after the server drains.
pub async fn run(
    config: Config,
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    config.validate()?;
    let addr = config.socket_addr()?;

    let frames = Arc::new(FrameBuffer::from_config(&config.buffer)?);
    let output = Arc::new(OutputBuffer::new(config.buffer.output_capacity)?);
    info!(
        "Buffers ready: {} raw frames, {} annotated",
        frames.capacity(),
        config.buffer.output_capacity
    );

    let worker = VisionWorker::new(
        frames.clone(),
        output.clone(),
        detector,
        tracker,
        WorkerSettings::from_config(&config),
    )?;
    let worker_stats = worker.stats();
    let worker = worker.spawn()?;

    let state = server::AppState::new(
        frames,
        output,
        MonotonicClock::new(),
        server::SessionSettings::from_config(&config.session),
        worker_stats,
    );
    let served = server::serve(addr, state, shutdown).await;

    tokio::task::spawn_blocking(move || worker.stop())
        .await
        .map_err(|e| RelayError::Io(std::io::Error::other(e)))?;
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer.max_seconds * config.buffer.target_fps, 200);
        assert_eq!(config.buffer.output_capacity, 10);
        assert_eq!(config.session.staleness_secs, 1.5);
        assert_eq!(config.session.egress_period(), Duration::from_millis(100));
        assert_eq!(config.socket_addr().unwrap().port(), 8000);
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let mut config = Config::default();
        config.buffer.target_fps = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffer.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.staleness_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.vision.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("vidrelay-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[buffer]\nmax_seconds = 2\ntarget_fps = 10\n\n[session]\nstaleness_secs = 3.0\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.buffer.max_seconds, 2);
        assert_eq!(config.session.staleness_secs, 3.0);
        // untouched sections keep defaults
        assert_eq!(config.buffer.output_capacity, 10);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = Path::new("/nonexistent/vidrelay.toml");
        assert!(matches!(Config::load(Some(path)), Err(RelayError::Config(_))));
    }
}
