use std::path::PathBuf;
use std::sync::Arc;

/// An in-memory model artifact: the full ONNX protobuf (graph topology and
/// weights in one blob), typically embedded by a packaging step.
#[derive(Clone, Debug)]
pub struct ModelArtifact {
    name: String,
    bytes: Arc<Vec<u8>>,
}

impl ModelArtifact {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Where a model comes from. Mirrors the layered loading paths: a file on
/// disk, a URL to download into the model cache, or bytes already in memory.
#[derive(Clone, Debug)]
pub enum ModelSource {
    Path(PathBuf),
    Url(String),
    Embedded(ModelArtifact),
}

impl ModelSource {
    /// Short human-readable description for log lines and errors.
    pub fn describe(&self) -> String {
        match self {
            ModelSource::Path(p) => format!("file {}", p.display()),
            ModelSource::Url(u) => format!("url {u}"),
            ModelSource::Embedded(a) => format!("embedded artifact {}", a.name()),
        }
    }
}
