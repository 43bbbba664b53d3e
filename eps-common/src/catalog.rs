//! Endpoint catalog: ordered phases of endpoint descriptors.
//!
//! The catalog is pure data. It is supplied by an external discovery
//! collaborator — either built programmatically or loaded from a TOML
//! manifest — and never mutated during a sweep.

use crate::types::{EndpointDescriptor, Method};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while building or loading a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("catalog contains no phases")]
    Empty,

    #[error("phase '{0}' contains no endpoints")]
    EmptyPhase(String),

    #[error("duplicate endpoint in catalog: {method} {path}")]
    Duplicate { method: Method, path: String },
}

/// A named, ordered group of endpoint descriptors tested sequentially
/// relative to other phases.
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: String,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl Phase {
    pub fn new(name: impl Into<String>, endpoints: Vec<EndpointDescriptor>) -> Self {
        let name = name.into();
        // Stamp the phase name onto each descriptor so results can be
        // grouped without carrying the phase alongside them.
        let endpoints = endpoints
            .into_iter()
            .map(|mut e| {
                e.phase = name.clone();
                e
            })
            .collect();
        Self { name, endpoints }
    }
}

/// An ordered collection of phases. Built once per run.
#[derive(Debug, Clone)]
pub struct Catalog {
    phases: Vec<Phase>,
}

impl Catalog {
    /// Build a catalog from phases, validating that no descriptor appears
    /// twice. The rate-limit probe re-issues a descriptor by design and is
    /// exempt from this check (it runs outside the catalog).
    pub fn new(phases: Vec<Phase>) -> Result<Self, CatalogError> {
        if phases.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen: HashSet<(Method, &str)> = HashSet::new();
        for phase in &phases {
            if phase.endpoints.is_empty() {
                return Err(CatalogError::EmptyPhase(phase.name.clone()));
            }
            for endpoint in &phase.endpoints {
                if !seen.insert((endpoint.method, endpoint.path.as_str())) {
                    return Err(CatalogError::Duplicate {
                        method: endpoint.method,
                        path: endpoint.path.clone(),
                    });
                }
            }
        }

        debug!(
            phases = phases.len(),
            endpoints = phases.iter().map(|p| p.endpoints.len()).sum::<usize>(),
            "Catalog constructed"
        );

        Ok(Self { phases })
    }

    /// Load a catalog from a TOML manifest file.
    pub fn from_manifest_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_manifest_str(&content)
    }

    /// Parse a catalog from TOML manifest text.
    ///
    /// Manifest shape:
    ///
    /// ```toml
    /// [[phase]]
    /// name = "Core Infrastructure"
    ///
    /// [[phase.endpoint]]
    /// method = "GET"
    /// path = "/health"
    ///
    /// [[phase.endpoint]]
    /// method = "POST"
    /// path = "/api/v1/auth/login"
    /// requires_auth = false
    /// body = { email = "user@test.com", password = "password" }
    /// ```
    pub fn from_manifest_str(content: &str) -> Result<Self, CatalogError> {
        let manifest: RawManifest = toml::from_str(content)?;
        let phases = manifest
            .phase
            .into_iter()
            .map(|raw| {
                let endpoints = raw
                    .endpoint
                    .into_iter()
                    .map(|e| EndpointDescriptor {
                        method: e.method,
                        path: e.path,
                        phase: String::new(),
                        requires_auth: e.requires_auth,
                        body: e.body,
                        category: e.category,
                    })
                    .collect();
                Phase::new(raw.name, endpoints)
            })
            .collect();
        Self::new(phases)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Total number of endpoint descriptors across all phases.
    pub fn endpoint_count(&self) -> usize {
        self.phases.iter().map(|p| p.endpoints.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    phase: Vec<RawPhase>,
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    name: String,
    #[serde(default)]
    endpoint: Vec<RawEndpoint>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    method: Method,
    path: String,
    #[serde(default)]
    requires_auth: bool,
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default)]
    category: Option<String>,
}
