//! Extractors that turn every binding failure into [`AppError::Validation`],
//! so malformed input gets the same 422 response on every route.

use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::models::{CreateItem, ListParams, UpdateItem};

/// Request shapes that carry their own validation rules.
pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

impl Validate for CreateItem {
    fn validate(&self) -> AppResult<()> {
        CreateItem::validate(self)
    }
}

impl Validate for UpdateItem {
    fn validate(&self) -> AppResult<()> {
        UpdateItem::validate(self)
    }
}

impl Validate for ListParams {
    fn validate(&self) -> AppResult<()> {
        ListParams::validate(self)
    }
}

/// JSON body, deserialized and validated.
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// Query string, deserialized and validated.
pub struct ValidQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidQuery(value))
    }
}

/// Path parameters; a malformed id is a validation failure, not a 400.
pub struct ValidPath<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(ValidPath(value))
    }
}
