use crate::error::HandlerError;
use crate::model::{CreateProduct, CreateRestaurant, UpdateProduct};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct APIResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> APIResponse<T> {
    pub fn new(msg: &str, data: T) -> Self {
        APIResponse {
            status: msg.to_owned(),
            data: Some(data),
        }
    }
}

impl APIResponse<()> {
    pub fn new_from_msg(msg: &str) -> Self {
        APIResponse {
            status: msg.to_owned(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn validate_name(name: &str, entity: &str) -> Result<(), HandlerError> {
    if name.trim().is_empty() {
        return Err(HandlerError::ValidationError(format!("{} name must not be empty", entity)));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), HandlerError> {
    if !price.is_finite() || price < 0.0 {
        return Err(HandlerError::ValidationError(
            "price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

impl CreateProduct {
    pub fn validate(&self) -> Result<(), HandlerError> {
        validate_name(&self.name, "product")?;
        validate_price(self.price)
    }
}

impl UpdateProduct {
    pub fn validate(&self) -> Result<(), HandlerError> {
        if let Some(name) = &self.name {
            validate_name(name, "product")?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

impl CreateRestaurant {
    pub fn validate(&self) -> Result<(), HandlerError> {
        validate_name(&self.name, "restaurant")
    }
}
