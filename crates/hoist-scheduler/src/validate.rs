//! Request validation.
//!
//! Validation is pure: it touches neither the filesystem nor the network, so
//! a rejected request leaves no trace.

use hoist_core::{BuildRequest, Error, RegistryService, RequestId, Result};
use hoist_source::{IgnoreFilter, SourceLocation};

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub id: RequestId,
    pub service: RegistryService,
    pub request: BuildRequest,
}

fn validate_target(request: &BuildRequest) -> Result<RegistryService> {
    let service = request.config.service.parse::<RegistryService>()?;
    if request.config.repository.trim().is_empty() {
        return Err(Error::Validation("Repository cannot be blank".to_string()));
    }
    Ok(service)
}

/// Validate a build request: target registry, source, id and ignore patterns.
pub fn validate_build(request: BuildRequest) -> Result<ValidatedRequest> {
    let service = validate_target(&request)?;

    if request.config.source.trim().is_empty() {
        return Err(Error::Validation("Source cannot be blank".to_string()));
    }
    SourceLocation::parse(request.config.source.trim())?;

    let id = RequestId::parse(request.id.clone())?;
    IgnoreFilter::new(&request.ignores)?;

    Ok(ValidatedRequest {
        id,
        service,
        request,
    })
}

/// Validate a push-only request. The source is not needed.
pub fn validate_push(request: BuildRequest) -> Result<ValidatedRequest> {
    let service = validate_target(&request)?;
    let id = RequestId::parse(request.id.clone())?;

    Ok(ValidatedRequest {
        id,
        service,
        request,
    })
}
