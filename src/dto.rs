//! DTOs for REST API requests/responses.

use serde::{Deserialize, Serialize};

use crate::domain::{Location, LocationId, VehicleId, VehicleInfo};
use crate::error::ValidationError;
use crate::snapshot::RouteSnapshot;
use crate::solver::SolverStatus;

/// Body of `POST /locations`. The first location added becomes the depot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLocationRequest {
    pub id: LocationId,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub description: Option<String>,
    /// Ignored for the depot.
    #[serde(default)]
    pub demand: i64,
}

impl AddLocationRequest {
    pub fn to_location(&self) -> Result<Location, ValidationError> {
        let location = Location::new(self.id, self.latitude, self.longitude)?;
        Ok(match &self.description {
            Some(description) => location.with_description(description.clone()),
            None => location,
        })
    }
}

/// Body of `POST /vehicles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddVehicleRequest {
    pub id: VehicleId,
    #[serde(default)]
    pub name: Option<String>,
    pub capacity: i64,
}

impl AddVehicleRequest {
    pub fn to_info(&self) -> VehicleInfo {
        let name = self.name.clone().unwrap_or_else(|| format!("Vehicle {}", self.id));
        VehicleInfo::new(self.id, name)
    }
}

/// Body of `PUT /vehicles/{id}/capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityRequest {
    pub capacity: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub solver_engine: &'static str,
}

/// Latest published route along with the solver's state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    #[serde(flatten)]
    pub route: RouteSnapshot,
    pub solver_status: SolverStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
}

/// One server-sent event on `/route/stream`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StreamEvent {
    Route { route: RouteSnapshot },
    Failure { message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
