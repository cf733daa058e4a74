/**
 * API REST LIVESTATE - Serveur HTTP du kernel livestate
 *
 * RÔLE :
 * Expose la création/mise à jour des hosts et services, l'arbre des realms et
 * la lecture des compteurs livesynthesis.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum avec middleware auth : `x-api-key` -> utilisateur -> AccessScope
 * - Le scope est posé dans les extensions de la requête, les handlers le passent
 *   explicitement au cycle de vie et aux lectures
 * - Les écritures délèguent à `lifecycle`, qui déclenche les hooks livesynthesis
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health
 * - Un realm illisible répond 404 en lecture, 403 en écriture
 */

use crate::config::{KernelConfig, UserConf};
use crate::error::LivestateError;
use crate::health::{HealthTracker, KernelHealth};
use crate::lifecycle::{create_item, update_item};
use crate::livesynthesis::counters::Livesynthesis;
use crate::livesynthesis::rollup::{livesynthesis_view, LivesynthesisQuery, LivesynthesisView};
use crate::livesynthesis::{recompute, recompute_force, RecomputeReport};
use crate::models::{ChangeSet, Item, ItemKind, NewItem};
use crate::realm::{Realm, RealmError, RealmTree};
use crate::scope::AccessScope;
use crate::store::{LiveStore, StoreError};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LiveStore>,
    pub cfg: Arc<KernelConfig>,
    pub health_tracker: HealthTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Erreur API : code HTTP + message JSON `{"error": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn read(e: LivestateError) -> Self {
        Self::from_error(e, Access::Read)
    }

    fn write(e: LivestateError) -> Self {
        Self::from_error(e, Access::Write)
    }

    fn from_error(e: LivestateError, access: Access) -> Self {
        let status = status_of(&e, access);
        if status.is_server_error() {
            error!(error = %e, "request failed");
        }
        // en lecture, un realm illisible ne doit pas être distinguable d'un realm inconnu
        let message = match (&e, access) {
            (LivestateError::Forbidden(realm), Access::Read) => RealmError::UnknownRealm(realm.clone()).to_string(),
            _ => e.to_string(),
        };
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

fn status_of(e: &LivestateError, access: Access) -> StatusCode {
    use LivestateError as E;
    match e {
        E::NotFound(..) | E::Store(StoreError::NotFound(..)) => StatusCode::NOT_FOUND,
        E::Forbidden(_) if access == Access::Read => StatusCode::NOT_FOUND,
        E::Forbidden(_) => StatusCode::FORBIDDEN,
        E::Resolver(_) | E::Store(StoreError::Rejected(_)) | E::UnknownHost(_) | E::MissingHost => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        E::Realm(realm) | E::Store(StoreError::Realm(realm)) => match realm {
            RealmError::UnknownRealm(_) if access == Access::Read => StatusCode::NOT_FOUND,
            RealmError::UnknownRealm(_) | RealmError::UnknownParent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RealmError::Duplicate(_) | RealmError::Cycle { .. } => StatusCode::CONFLICT,
        },
        E::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
        E::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Scope d'un utilisateur configuré. Les realms sont désignés par nom (ou par id).
pub fn user_scope(user: &UserConf, tree: &RealmTree) -> AccessScope {
    if user.admin {
        return AccessScope::admin();
    }
    let ids: Vec<String> = user
        .realms
        .iter()
        .filter_map(|r| tree.find_by_name(r).cloned().or_else(|| tree.contains(r).then(|| r.clone())))
        .collect();
    if user.sub_realms {
        AccessScope::with_sub_realms(tree, ids)
    } else {
        AccessScope::realms(ids)
    }
}

async fn require_api_key(State(app): State<AppState>, mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let key = req.headers().get("x-api-key").and_then(|v| v.to_str().ok()).unwrap_or_default();
    let Some(user) = app.cfg.users.get(key) else {
        warn!(path = %req.uri().path(), "rejected request: missing or unknown api key");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let tree = app.store.realm_tree().map_err(|e| {
        error!(error = %e, "realm tree unavailable");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let scope = user_scope(user, &tree);
    req.extensions_mut().insert(scope);
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/realm", post(post_realm))
        .route("/realm/{id}", get(get_realm).patch(patch_realm))
        .route("/host", post(post_host))
        .route("/host/{id}", get(get_host).patch(patch_host))
        .route("/service", post(post_service))
        .route("/service/{id}", get(get_service).patch(patch_service))
        .route("/livesynthesis", get(list_livesynthesis))
        .route("/livesynthesis/recompute", post(post_recompute))
        .route("/livesynthesis/{realm}", get(get_livesynthesis))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> ApiResult<KernelHealth> {
    app.health_tracker.get_health(app.store.as_ref()).map(Json).map_err(ApiError::read)
}

#[derive(Debug, Deserialize)]
struct NewRealm {
    name: String,
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoveRealm {
    parent: Option<String>,
}

fn require_admin(scope: &AccessScope) -> Result<(), ApiError> {
    if scope.is_admin() {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::FORBIDDEN, "admin scope required"))
    }
}

// POST /realm (admin)
async fn post_realm(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Json(body): Json<NewRealm>,
) -> Result<(StatusCode, Json<Realm>), ApiError> {
    require_admin(&scope)?;
    let store = app.store.as_ref();
    let realm = store
        .insert_realm(&body.name, body.parent.as_deref())
        .map_err(|e| ApiError::write(e.into()))?;
    // ligne livesynthesis vide dès la création du realm
    recompute(store, Some(&realm.id)).map_err(ApiError::write)?;
    Ok((StatusCode::CREATED, Json(realm)))
}

// GET /realm/{id}
async fn get_realm(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Path(id): Path<String>,
) -> ApiResult<Realm> {
    if !scope.can_read(&id) {
        return Err(ApiError::read(LivestateError::Forbidden(id)));
    }
    let tree = app.store.realm_tree().map_err(|e| ApiError::read(e.into()))?;
    tree.get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::read(RealmError::UnknownRealm(id).into()))
}

// PATCH /realm/{id} (admin) : déplacement dans l'arbre
async fn patch_realm(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Path(id): Path<String>,
    Json(body): Json<MoveRealm>,
) -> ApiResult<Realm> {
    require_admin(&scope)?;
    app.store
        .move_realm(&id, body.parent.as_deref())
        .map(Json)
        .map_err(|e| ApiError::write(e.into()))
}

fn create(app: &AppState, kind: ItemKind, scope: &AccessScope, body: NewItem) -> Result<(StatusCode, Json<Item>), ApiError> {
    create_item(app.store.as_ref(), kind, body, scope)
        .map(|item| (StatusCode::CREATED, Json(item)))
        .map_err(ApiError::write)
}

fn update(app: &AppState, kind: ItemKind, id: &str, scope: &AccessScope, change: ChangeSet) -> ApiResult<Item> {
    update_item(app.store.as_ref(), kind, id, change, scope)
        .map(Json)
        .map_err(ApiError::write)
}

fn fetch(app: &AppState, kind: ItemKind, id: String, scope: &AccessScope) -> ApiResult<Item> {
    let item = app
        .store
        .find_item(kind, &id)
        .map_err(|e| ApiError::read(e.into()))?
        .filter(|item| scope.can_read(&item.realm))
        .ok_or_else(|| ApiError::read(LivestateError::NotFound(kind, id)))?;
    Ok(Json(item))
}

// POST /host
async fn post_host(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Json(body): Json<NewItem>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    create(&app, ItemKind::Host, &scope, body)
}

// POST /service
async fn post_service(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Json(body): Json<NewItem>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    create(&app, ItemKind::Service, &scope, body)
}

// GET /host/{id}
async fn get_host(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Path(id): Path<String>,
) -> ApiResult<Item> {
    fetch(&app, ItemKind::Host, id, &scope)
}

// GET /service/{id}
async fn get_service(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Path(id): Path<String>,
) -> ApiResult<Item> {
    fetch(&app, ItemKind::Service, id, &scope)
}

// PATCH /host/{id}
async fn patch_host(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Path(id): Path<String>,
    Json(change): Json<ChangeSet>,
) -> ApiResult<Item> {
    update(&app, ItemKind::Host, &id, &scope, change)
}

// PATCH /service/{id}
async fn patch_service(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Path(id): Path<String>,
    Json(change): Json<ChangeSet>,
) -> ApiResult<Item> {
    update(&app, ItemKind::Service, &id, &scope, change)
}

// GET /livesynthesis (lignes lisibles par l'appelant)
async fn list_livesynthesis(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
) -> ApiResult<Vec<Livesynthesis>> {
    let rows = app.store.livesynthesis_rows().map_err(|e| ApiError::read(e.into()))?;
    Ok(Json(rows.into_iter().filter(|row| scope.can_read(&row.realm)).collect()))
}

// GET /livesynthesis/{realm}?history=1&concatenation=1
async fn get_livesynthesis(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Path(realm): Path<String>,
    Query(query): Query<LivesynthesisQuery>,
) -> ApiResult<LivesynthesisView> {
    livesynthesis_view(app.store.as_ref(), &realm, &scope, query)
        .map(Json)
        .map_err(ApiError::read)
}

#[derive(Debug, Deserialize)]
struct RecomputeParams {
    realm: Option<String>,
}

// POST /livesynthesis/recompute (admin)
async fn post_recompute(
    State(app): State<AppState>,
    Extension(scope): Extension<AccessScope>,
    Query(params): Query<RecomputeParams>,
) -> ApiResult<RecomputeReport> {
    require_admin(&scope)?;
    recompute_force(app.store.as_ref(), params.realm.as_deref())
        .map(Json)
        .map_err(ApiError::write)
}
