use serde::Serialize;
use serde_json::Value;

use crate::database::models::{Asset, Breeder, Dog, Image, Litter};
use crate::services::BreederCascade;

/// Wire form of an asset as it leaves the API.
///
/// The stored form of a breeder carries its password hash and salt, so every
/// response body goes through this instead of the model's own `Serialize`.
pub trait ApiView: Asset {
    fn to_api_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl ApiView for Dog {}
impl ApiView for Litter {}
impl ApiView for Image {}

/// Breeder without credentials; `superuser` only shows up when it is true
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicBreeder<'a> {
    pub id: &'a str,
    pub firstname: &'a str,
    pub lastname: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub email: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub superuser: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl<'a> From<&'a Breeder> for PublicBreeder<'a> {
    fn from(breeder: &'a Breeder) -> Self {
        Self {
            id: &breeder.id,
            firstname: &breeder.firstname,
            lastname: &breeder.lastname,
            city: &breeder.city,
            state: &breeder.state,
            email: &breeder.email,
            superuser: breeder.superuser,
            deleted_at: breeder.deleted_at,
        }
    }
}

impl ApiView for Breeder {
    fn to_api_value(&self) -> Value {
        serde_json::to_value(PublicBreeder::from(self)).unwrap_or_default()
    }
}

pub fn list_to_api_value<T: ApiView>(assets: &[T]) -> Value {
    Value::Array(assets.iter().map(ApiView::to_api_value).collect())
}

/// `{breeder, dogs, litters}` with the breeder sanitized
pub fn cascade_to_api_value(cascade: &BreederCascade) -> Value {
    serde_json::json!({
        "breeder": cascade.breeder.to_api_value(),
        "dogs": list_to_api_value(&cascade.dogs),
        "litters": list_to_api_value(&cascade.litters),
    })
}

/// `PUT` result: `{updated: [fields], result: asset}`
pub fn update_to_api_value<T: ApiView>(fields: &[String], asset: &T) -> Value {
    serde_json::json!({
        "updated": fields,
        "result": asset.to_api_value(),
    })
}
