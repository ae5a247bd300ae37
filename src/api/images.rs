use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use super::email_of;
use crate::app::AppContext;
use crate::auth::{AuthUser, IdentityProvider};
use crate::error::{ForgeError, Result};
use crate::generation::{
    BulkGenerationRequest, BulkGenerationResult, GalleryImage, GenerationRequest, GenerationResult,
};
use crate::http::{
    ApiResponse, CreatedResponse, JsonResponse, PaginatedData, PaginationQuery, RouteModule,
    ValidatedJson,
};

pub struct ImageRoutes;

impl RouteModule for ImageRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", post(generate_image).get(list_images))
            .route("/bulk", post(generate_bulk))
            .route("/{id}", get(show_image))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/images")
    }
}

async fn generate_image(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
    ValidatedJson(request): ValidatedJson<GenerationRequest>,
) -> Result<CreatedResponse<GenerationResult>> {
    let result = ctx
        .generation
        .generate(&user.id, email_of(&user), request)
        .await?;
    let location = format!("/api/images/{}", result.image.id);
    Ok(ApiResponse::created(result, location))
}

/// Per-prompt validation happens in the service so errors can name the index.
async fn generate_bulk(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
    Json(request): Json<BulkGenerationRequest>,
) -> JsonResponse<BulkGenerationResult> {
    let result = ctx
        .generation
        .generate_bulk(&user.id, email_of(&user), request)
        .await?;
    Ok(ApiResponse::success(result))
}

async fn list_images(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
    Query(page): Query<PaginationQuery>,
) -> JsonResponse<PaginatedData<Vec<GalleryImage>>> {
    page.validate()?;
    let gallery = ctx.generation.gallery();
    let images = gallery.list(&user.id, page.limit(), page.offset()).await?;
    let total = gallery.count(&user.id).await?;
    Ok(ApiResponse::paginated(images, total, page.page, page.per_page))
}

async fn show_image(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
    Path(id): Path<String>,
) -> JsonResponse<GalleryImage> {
    ctx.generation
        .gallery()
        .get(&user.id, &id)
        .await?
        .map(ApiResponse::success)
        .ok_or_else(|| ForgeError::not_found(format!("Image {} not found", id)))
}
