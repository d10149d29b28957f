//! Endpoint types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SourceError;

/// A discovered service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Logical name of the endpoint
    pub name: String,

    /// Address, e.g. `10.0.0.5:8080` or a URL
    pub address: String,

    /// Relative weight for load balancing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.weight {
            Some(weight) => write!(f, "{} ({}, weight {})", self.name, self.address, weight),
            None => write!(f, "{} ({})", self.name, self.address),
        }
    }
}

/// Endpoint document accepted by file sources
///
/// Either a bare list or a mapping with an `endpoints` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointList {
    Bare(Vec<Endpoint>),
    Wrapped { endpoints: Vec<Endpoint> },
}

impl EndpointList {
    /// Unwrap and validate the endpoints
    pub fn into_endpoints(self) -> Result<Vec<Endpoint>, SourceError> {
        let endpoints = match self {
            EndpointList::Bare(endpoints) | EndpointList::Wrapped { endpoints } => endpoints,
        };

        for (index, endpoint) in endpoints.iter().enumerate() {
            if endpoint.name.trim().is_empty() {
                return Err(SourceError::Malformed(format!(
                    "endpoint #{} has an empty name",
                    index + 1
                )));
            }
            if endpoint.address.trim().is_empty() {
                return Err(SourceError::Malformed(format!(
                    "endpoint '{}' has an empty address",
                    endpoint.name
                )));
            }
        }

        Ok(endpoints)
    }
}
