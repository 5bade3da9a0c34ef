//! larder-axum: HTTP surface for the Larder asset backend.
//!
//! | Route | Auth | |
//! |---|---|---|
//! | `POST /assets/{slot}` | admin | multipart `file` field, returns `{url}` |
//! | `DELETE /assets/{slot}` | admin | returns `{success}` |
//! | `GET /assets`, `GET /assets/{slot}` | none | current URLs |
//! | `POST /assets/cv/link` | admin | short-lived download link for the CV |
//! | `POST /assets/reclaim` | admin | sweep unreferenced local files |
//! | `GET /uploads/{file}` | none | fixed-name branding files |
//! | `GET /download/{file}?token=` | token | private files |

pub mod app;
pub mod routes;
pub mod state;
mod error;
pub use error::LarderAxumError;
pub use state::{AssetState, HttpOptions};

pub use app::AxumApp;
