//! HTTP API for accounts and inventory
//!
//! Every route except `/health` and `/auth/*` needs an
//! `Authorization: Bearer <token>` header. The session's user id becomes the
//! [`Principal`] the inventory checks ownership against.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stockroom::{
    BarcodeMatch, InventoryItem, ItemFilter, ItemPatch, Kit, KitPatch, KitShortfall, Location,
    LocationPatch, MovementFilter, MovementKind, NewItem, NewKit, NewLocation, NewPractice,
    NewShoppingEntry, Practice, PracticePatch, Principal, ShoppingEntryPatch, ShoppingListEntry,
    StockMovement, TransferOutcome, TransferRequest,
};
use tracing::{info, warn};

use crate::AppState;

type ApiError = (StatusCode, String);
type ApiResult<T> = Result<T, ApiError>;

/// Create the API router
pub fn router(state: Arc<AppState>) -> Router {
    let image_limit =
        usize::try_from(state.inventory.config().max_attachment_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/practices", get(list_practices).post(create_practice))
        .route(
            "/practices/{id}",
            get(get_practice)
                .patch(update_practice)
                .delete(delete_practice),
        )
        .route("/practices/{id}/members", post(add_member))
        .route("/practices/{id}/members/{user_id}", delete(remove_member))
        .route(
            "/practices/{id}/locations",
            get(list_locations).post(create_location),
        )
        .route(
            "/locations/{id}",
            patch(update_location).delete(delete_location),
        )
        .route("/practices/{id}/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/items/{id}/adjust", post(adjust_item))
        .route("/items/{id}/stocktake", post(stocktake_item))
        .route(
            "/items/{id}/image",
            get(get_item_image)
                .put(put_item_image)
                .layer(DefaultBodyLimit::max(image_limit)),
        )
        .route("/practices/{id}/low-stock", get(low_stock))
        .route("/transfers", post(transfer))
        .route("/practices/{id}/kits", get(list_kits).post(create_kit))
        .route(
            "/kits/{id}",
            get(get_kit).patch(update_kit).delete(delete_kit),
        )
        .route("/kits/{id}/availability", get(kit_availability))
        .route("/kits/{id}/use", post(use_kit))
        .route(
            "/practices/{id}/shopping-list",
            get(list_shopping).post(add_shopping_entry),
        )
        .route(
            "/practices/{id}/shopping-list/populate",
            post(populate_shopping),
        )
        .route(
            "/practices/{id}/shopping-list/clear-purchased",
            post(clear_purchased),
        )
        .route(
            "/shopping-list/{id}",
            patch(update_shopping_entry).delete(remove_shopping_entry),
        )
        .route("/shopping-list/{id}/purchased", post(mark_purchased))
        .route("/practices/{id}/movements", get(list_movements))
        .route("/practices/{id}/barcode/{code}", get(lookup_barcode))
        .with_state(state)
}

// =============================================================================
// Errors and authentication
// =============================================================================

/// Map an inventory error to a status code and message
fn inventory_error(e: stockroom::Error) -> ApiError {
    use stockroom::Error;

    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Unauthorized(_) => StatusCode::FORBIDDEN,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::InsufficientStock { .. } => StatusCode::CONFLICT,
        Error::Lookup(_) => StatusCode::BAD_GATEWAY,
        _ => {
            warn!(error = %e, "Inventory operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

fn internal(e: anyhow::Error) -> ApiError {
    warn!(error = %e, "Database operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing bearer token".to_string(),
        ))
}

/// Resolve the request's bearer token to the acting principal
fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Principal> {
    let token = bearer_token(headers)?;
    let user_id = state
        .db
        .resolve_session(token, state.session_ttl)
        .map_err(internal)?
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid or expired session".to_string(),
        ))?;
    Ok(Principal::new(user_id))
}

// =============================================================================
// Accounts
// =============================================================================

/// Health check endpoint
async fn health() -> &'static str {
    "ok"
}

/// Request body for signup and login
#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

/// Response for a successful signup or login
#[derive(Debug, Serialize)]
struct SessionResponse {
    token: String,
    user_id: String,
}

/// Create an account and start a session
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Email and password are required".to_string(),
        ));
    }

    let account = state
        .db
        .create_account(&req.email, &req.password)
        .map_err(internal)?
        .ok_or((
            StatusCode::CONFLICT,
            "Email already registered".to_string(),
        ))?;
    purge_sessions(&state);
    let session = state
        .db
        .create_session(&account.user_id)
        .map_err(internal)?;

    info!(user_id = %account.user_id, "Account signed up");
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token: session.token,
            user_id: account.user_id,
        }),
    ))
}

/// Start a session for an existing account
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> ApiResult<Json<SessionResponse>> {
    let Some(account) = state
        .db
        .verify_credentials(&req.email, &req.password)
        .map_err(internal)?
    else {
        warn!("Login failed: invalid credentials");
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        ));
    };

    purge_sessions(&state);
    let session = state
        .db
        .create_session(&account.user_id)
        .map_err(internal)?;
    Ok(Json(SessionResponse {
        token: session.token,
        user_id: account.user_id,
    }))
}

/// Drop expired sessions; a failure is logged and does not block sign-in
fn purge_sessions(state: &AppState) {
    match state.db.purge_expired_sessions(state.session_ttl) {
        Ok(0) => {}
        Ok(purged) => info!(purged, "Removed expired sessions"),
        Err(e) => warn!("Failed to purge expired sessions: {e:#}"),
    }
}

/// End the current session
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let token = bearer_token(&headers)?;
    if state.db.revoke_session(token).map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::UNAUTHORIZED, "Unknown session".to_string()))
    }
}

// =============================================================================
// Practices
// =============================================================================

async fn list_practices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Practice>>> {
    let principal = authenticate(&state, &headers)?;
    let practices = state
        .inventory
        .list_practices(&principal)
        .await
        .map_err(inventory_error)?;
    Ok(Json(practices))
}

async fn create_practice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(new): Json<NewPractice>,
) -> ApiResult<(StatusCode, Json<Practice>)> {
    let principal = authenticate(&state, &headers)?;
    let practice = state
        .inventory
        .create_practice(&principal, new)
        .await
        .map_err(inventory_error)?;
    Ok((StatusCode::CREATED, Json(practice)))
}

async fn get_practice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Practice>> {
    let principal = authenticate(&state, &headers)?;
    let practice = state
        .inventory
        .get_practice(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(practice))
}

async fn update_practice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<PracticePatch>,
) -> ApiResult<Json<Practice>> {
    let principal = authenticate(&state, &headers)?;
    let practice = state
        .inventory
        .update_practice(&principal, &id, patch)
        .await
        .map_err(inventory_error)?;
    Ok(Json(practice))
}

async fn delete_practice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let principal = authenticate(&state, &headers)?;
    state
        .inventory
        .delete_practice(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for adding a member
#[derive(Debug, Deserialize)]
struct MemberRequest {
    user_id: String,
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<MemberRequest>,
) -> ApiResult<Json<Practice>> {
    let principal = authenticate(&state, &headers)?;
    // Owner check first so only owners learn whether an account exists
    stockroom::ownership::ensure_practice_owner(state.inventory.store(), &id, &principal)
        .await
        .map_err(inventory_error)?;
    if state
        .db
        .get_account(req.user_id.trim())
        .map_err(internal)?
        .is_none()
    {
        return Err((StatusCode::NOT_FOUND, "Unknown user".to_string()));
    }

    let practice = state
        .inventory
        .add_member(&principal, &id, &req.user_id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(practice))
}

async fn remove_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Practice>> {
    let principal = authenticate(&state, &headers)?;
    let practice = state
        .inventory
        .remove_member(&principal, &id, &user_id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(practice))
}

// =============================================================================
// Locations
// =============================================================================

async fn list_locations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Location>>> {
    let principal = authenticate(&state, &headers)?;
    let locations = state
        .inventory
        .list_locations(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(locations))
}

async fn create_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(new): Json<NewLocation>,
) -> ApiResult<(StatusCode, Json<Location>)> {
    let principal = authenticate(&state, &headers)?;
    let location = state
        .inventory
        .create_location(&principal, &id, new)
        .await
        .map_err(inventory_error)?;
    Ok((StatusCode::CREATED, Json(location)))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<LocationPatch>,
) -> ApiResult<Json<Location>> {
    let principal = authenticate(&state, &headers)?;
    let location = state
        .inventory
        .update_location(&principal, &id, patch)
        .await
        .map_err(inventory_error)?;
    Ok(Json(location))
}

async fn delete_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let principal = authenticate(&state, &headers)?;
    state
        .inventory
        .delete_location(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Items
// =============================================================================

async fn list_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<Json<Vec<InventoryItem>>> {
    let principal = authenticate(&state, &headers)?;
    let items = state
        .inventory
        .list_items(&principal, &id, &filter)
        .await
        .map_err(inventory_error)?;
    Ok(Json(items))
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(new): Json<NewItem>,
) -> ApiResult<(StatusCode, Json<InventoryItem>)> {
    let principal = authenticate(&state, &headers)?;
    let item = state
        .inventory
        .create_item(&principal, &id, new)
        .await
        .map_err(inventory_error)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<InventoryItem>> {
    let principal = authenticate(&state, &headers)?;
    let item = state
        .inventory
        .get_item(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<ItemPatch>,
) -> ApiResult<Json<InventoryItem>> {
    let principal = authenticate(&state, &headers)?;
    let item = state
        .inventory
        .update_item(&principal, &id, patch)
        .await
        .map_err(inventory_error)?;
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let principal = authenticate(&state, &headers)?;
    state
        .inventory
        .delete_item(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for a manual quantity change
#[derive(Debug, Deserialize)]
struct AdjustRequest {
    delta: i64,
    #[serde(default = "default_adjust_kind")]
    kind: MovementKind,
    #[serde(default)]
    note: Option<String>,
}

fn default_adjust_kind() -> MovementKind {
    MovementKind::Adjustment
}

async fn adjust_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<Json<InventoryItem>> {
    let principal = authenticate(&state, &headers)?;
    let item = state
        .inventory
        .adjust_quantity(&principal, &id, req.delta, req.kind, req.note)
        .await
        .map_err(inventory_error)?;
    Ok(Json(item))
}

/// Request body for recording a physical count
#[derive(Debug, Deserialize)]
struct StocktakeRequest {
    quantity: u32,
    #[serde(default)]
    note: Option<String>,
}

async fn stocktake_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StocktakeRequest>,
) -> ApiResult<Json<InventoryItem>> {
    let principal = authenticate(&state, &headers)?;
    let item = state
        .inventory
        .set_quantity(&principal, &id, req.quantity, req.note)
        .await
        .map_err(inventory_error)?;
    Ok(Json(item))
}

async fn get_item_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let principal = authenticate(&state, &headers)?;
    let data = state
        .inventory
        .item_image(&principal, &id)
        .await
        .map_err(inventory_error)?
        .ok_or((StatusCode::NOT_FOUND, "Item has no image".to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

async fn put_item_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<InventoryItem>> {
    let principal = authenticate(&state, &headers)?;
    let item = state
        .inventory
        .attach_image(&principal, &id, body)
        .await
        .map_err(inventory_error)?;
    Ok(Json(item))
}

async fn low_stock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<InventoryItem>>> {
    let principal = authenticate(&state, &headers)?;
    let items = state
        .inventory
        .low_stock_items(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(items))
}

async fn transfer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Json<TransferOutcome>> {
    let principal = authenticate(&state, &headers)?;
    let outcome = state
        .inventory
        .transfer_stock(&principal, req)
        .await
        .map_err(inventory_error)?;
    Ok(Json(outcome))
}

// =============================================================================
// Kits
// =============================================================================

async fn list_kits(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Kit>>> {
    let principal = authenticate(&state, &headers)?;
    let kits = state
        .inventory
        .list_kits(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(kits))
}

async fn create_kit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(new): Json<NewKit>,
) -> ApiResult<(StatusCode, Json<Kit>)> {
    let principal = authenticate(&state, &headers)?;
    let kit = state
        .inventory
        .create_kit(&principal, &id, new)
        .await
        .map_err(inventory_error)?;
    Ok((StatusCode::CREATED, Json(kit)))
}

async fn get_kit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Kit>> {
    let principal = authenticate(&state, &headers)?;
    let kit = state
        .inventory
        .get_kit(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(kit))
}

async fn update_kit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<KitPatch>,
) -> ApiResult<Json<Kit>> {
    let principal = authenticate(&state, &headers)?;
    let kit = state
        .inventory
        .update_kit(&principal, &id, patch)
        .await
        .map_err(inventory_error)?;
    Ok(Json(kit))
}

async fn delete_kit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let principal = authenticate(&state, &headers)?;
    state
        .inventory
        .delete_kit(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// How many times a kit is used or checked
#[derive(Debug, Deserialize)]
struct KitCount {
    #[serde(default = "default_kit_count")]
    count: u32,
}

fn default_kit_count() -> u32 {
    1
}

async fn kit_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<KitCount>,
) -> ApiResult<Json<Vec<KitShortfall>>> {
    let principal = authenticate(&state, &headers)?;
    let shortfalls = state
        .inventory
        .kit_availability(&principal, &id, query.count)
        .await
        .map_err(inventory_error)?;
    Ok(Json(shortfalls))
}

async fn use_kit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<KitCount>,
) -> ApiResult<Json<Vec<InventoryItem>>> {
    let principal = authenticate(&state, &headers)?;
    let items = state
        .inventory
        .use_kit(&principal, &id, req.count)
        .await
        .map_err(inventory_error)?;
    Ok(Json(items))
}

// =============================================================================
// Shopping list
// =============================================================================

#[derive(Debug, Deserialize)]
struct ShoppingListQuery {
    #[serde(default)]
    include_purchased: bool,
}

async fn list_shopping(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ShoppingListQuery>,
) -> ApiResult<Json<Vec<ShoppingListEntry>>> {
    let principal = authenticate(&state, &headers)?;
    let entries = state
        .inventory
        .list_shopping_list(&principal, &id, query.include_purchased)
        .await
        .map_err(inventory_error)?;
    Ok(Json(entries))
}

async fn add_shopping_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(new): Json<NewShoppingEntry>,
) -> ApiResult<(StatusCode, Json<ShoppingListEntry>)> {
    let principal = authenticate(&state, &headers)?;
    let entry = state
        .inventory
        .add_shopping_entry(&principal, &id, new)
        .await
        .map_err(inventory_error)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn populate_shopping(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ShoppingListEntry>>> {
    let principal = authenticate(&state, &headers)?;
    let added = state
        .inventory
        .populate_from_low_stock(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(added))
}

/// Response for clearing purchased entries
#[derive(Debug, Serialize)]
struct ClearedResponse {
    removed: usize,
}

async fn clear_purchased(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<ClearedResponse>> {
    let principal = authenticate(&state, &headers)?;
    let removed = state
        .inventory
        .clear_purchased(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(Json(ClearedResponse { removed }))
}

async fn update_shopping_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<ShoppingEntryPatch>,
) -> ApiResult<Json<ShoppingListEntry>> {
    let principal = authenticate(&state, &headers)?;
    let entry = state
        .inventory
        .update_shopping_entry(&principal, &id, patch)
        .await
        .map_err(inventory_error)?;
    Ok(Json(entry))
}

async fn remove_shopping_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let principal = authenticate(&state, &headers)?;
    state
        .inventory
        .remove_shopping_entry(&principal, &id)
        .await
        .map_err(inventory_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PurchasedQuery {
    #[serde(default = "default_restock")]
    restock: bool,
}

fn default_restock() -> bool {
    true
}

async fn mark_purchased(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<PurchasedQuery>,
) -> ApiResult<Json<ShoppingListEntry>> {
    let principal = authenticate(&state, &headers)?;
    let entry = state
        .inventory
        .mark_purchased(&principal, &id, query.restock)
        .await
        .map_err(inventory_error)?;
    Ok(Json(entry))
}

// =============================================================================
// History and barcodes
// =============================================================================

async fn list_movements(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(filter): Query<MovementFilter>,
) -> ApiResult<Json<Vec<StockMovement>>> {
    let principal = authenticate(&state, &headers)?;
    let movements = state
        .inventory
        .list_movements(&principal, &id, &filter)
        .await
        .map_err(inventory_error)?;
    Ok(Json(movements))
}

async fn lookup_barcode(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, code)): Path<(String, String)>,
) -> ApiResult<Json<BarcodeMatch>> {
    let principal = authenticate(&state, &headers)?;
    let found = state
        .inventory
        .lookup_barcode(&principal, &id, &code)
        .await
        .map_err(inventory_error)?;
    Ok(Json(found))
}
