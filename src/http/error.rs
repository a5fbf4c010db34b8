use rouille::Response;

use crate::error::CatalogError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => ApiError::NotFound(format!("track {} not found", id)),

            CatalogError::Validation(msg) => ApiError::BadRequest(msg),

            e @ CatalogError::InvalidName(_) => ApiError::BadRequest(e.to_string()),

            e @ (CatalogError::Storage(_)
            | CatalogError::Database(_)
            | CatalogError::Internal(_)) => {
                log::error!("request failed: {e}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                Response::text(msg).with_status_code(status)
            }
        }
    }
}
