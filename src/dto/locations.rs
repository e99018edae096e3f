use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Location;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLocationRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct LocationList {
    #[schema(value_type = Vec<Location>)]
    pub items: Vec<Location>,
}
