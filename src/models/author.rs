//! Author and publisher models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Author model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: i32,
    pub code: String,
    pub last_name: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Author as embedded in item views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthorShort {
    pub id: i32,
    pub last_name: String,
    pub first_name: Option<String>,
}

impl From<&Author> for AuthorShort {
    fn from(author: &Author) -> Self {
        Self {
            id: author.id,
            last_name: author.last_name.clone(),
            first_name: author.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAuthor {
    #[validate(length(min = 1, message = "last_name must not be empty"))]
    pub last_name: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
}

/// Publisher model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Publisher {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublisherShort {
    pub id: i32,
    pub name: String,
}

impl From<&Publisher> for PublisherShort {
    fn from(publisher: &Publisher) -> Self {
        Self {
            id: publisher.id,
            name: publisher.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePublisher {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
}
