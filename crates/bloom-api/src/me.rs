use axum::Json;
use axum::extract::Extension;

use bloom_types::api::MeResponse;

use crate::middleware::CurrentUser;

pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.id,
        email: user.email,
        handle: user.handle,
    })
}
