use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ramp_core::content::{self, FlowPatch, NewFlow};
use ramp_core::{CoreResult, versioning};
use ramp_db::Database;
use ramp_types::api::{
    Claims, CreateComponentRequest, CreateFlowRequest, CreateStepRequest, FlowResponse,
    UpdateComponentRequest, UpdateFlowRequest, UpdateStepRequest, VersionResponse,
};
use ramp_types::models::{Component, ComponentPayload, Flow, FlowStep, FlowVersion};

use crate::auth::AppState;
use crate::error::blocking;
use crate::middleware::require_moderator;

#[derive(Debug, Deserialize)]
pub struct ListFlowsQuery {
    /// Moderators may ask for soft-deleted flows too.
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub rank: String,
    pub required: bool,
    pub components: Vec<ComponentResponse>,
}

#[derive(Debug, Serialize)]
pub struct ComponentResponse {
    pub id: Uuid,
    pub title: String,
    pub rank: String,
    pub required: bool,
    pub payload: ComponentPayload,
}

// -- Flows --

pub async fn list_flows(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListFlowsQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let include_inactive = query.include_inactive && claims.role.can_moderate();

    let flows = blocking(move || {
        let flows = content::list_flows(&state.db, include_inactive)?;
        flows
            .into_iter()
            .map(|f| flow_response(&state.db, f))
            .collect::<CoreResult<Vec<_>>>()
    })
    .await?;

    Ok(Json(flows))
}

pub async fn create_flow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateFlowRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;
    let created_by = claims.sub;

    let flow = blocking(move || {
        let flow = content::create_flow(
            &state.db,
            NewFlow {
                name: req.name,
                description: req.description,
                sequential: req.sequential,
                allow_self_pause: req.allow_self_pause,
                created_by,
            },
        )?;
        flow_response(&state.db, flow)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(flow)))
}

pub async fn get_flow(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let flow = blocking(move || {
        let flow = content::get_flow(&state.db, flow_id)?;
        flow_response(&state.db, flow)
    })
    .await?;

    Ok(Json(flow))
}

pub async fn update_flow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
    Json(req): Json<UpdateFlowRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let flow = blocking(move || {
        let flow = content::update_flow(
            &state.db,
            flow_id,
            FlowPatch {
                name: req.name,
                description: req.description,
                sequential: req.sequential,
                allow_self_pause: req.allow_self_pause,
            },
        )?;
        flow_response(&state.db, flow)
    })
    .await?;

    Ok(Json(flow))
}

pub async fn delete_flow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;
    blocking(move || content::delete_flow(&state.db, flow_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Steps --

pub async fn list_steps(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let steps = blocking(move || {
        let steps = content::list_steps(&state.db, flow_id)?;
        steps
            .into_iter()
            .map(|step| {
                let components = content::list_components(&state.db, step.id)?;
                Ok(step_response(step, components))
            })
            .collect::<CoreResult<Vec<_>>>()
    })
    .await?;

    Ok(Json(steps))
}

pub async fn create_step(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
    Json(req): Json<CreateStepRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let step = blocking(move || {
        content::add_step(
            &state.db,
            flow_id,
            &req.title,
            &req.description,
            req.required,
            req.after,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(step_response(step, vec![]))))
}

pub async fn update_step(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(step_id): Path<Uuid>,
    Json(req): Json<UpdateStepRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let step = blocking(move || {
        let step = content::update_step(
            &state.db,
            step_id,
            req.title.as_deref(),
            req.description.as_deref(),
            req.required,
        )?;
        let components = content::list_components(&state.db, step.id)?;
        Ok(step_response(step, components))
    })
    .await?;

    Ok(Json(step))
}

pub async fn delete_step(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(step_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;
    blocking(move || content::delete_step(&state.db, step_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Components --

pub async fn create_component(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(step_id): Path<Uuid>,
    Json(req): Json<CreateComponentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let component = blocking(move || {
        content::add_component(
            &state.db,
            step_id,
            &req.title,
            req.required,
            &req.payload,
            req.after,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(component_response(component))))
}

pub async fn update_component(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(component_id): Path<Uuid>,
    Json(req): Json<UpdateComponentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let component = blocking(move || {
        content::update_component(
            &state.db,
            component_id,
            req.title.as_deref(),
            req.required,
            req.payload.as_ref(),
        )
    })
    .await?;

    Ok(Json(component_response(component)))
}

pub async fn delete_component(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(component_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;
    blocking(move || content::delete_component(&state.db, component_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Publishing --

pub async fn publish_flow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let version = blocking(move || versioning::publish_flow(&state.db, flow_id)).await?;

    Ok((StatusCode::CREATED, Json(version_response(version))))
}

pub async fn list_versions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(flow_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;

    let versions = blocking(move || versioning::list_versions(&state.db, flow_id)).await?;

    Ok(Json(
        versions
            .into_iter()
            .map(version_response)
            .collect::<Vec<_>>(),
    ))
}

pub async fn delete_version(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(version_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    require_moderator(&claims)?;
    blocking(move || versioning::delete_version(&state.db, version_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Mapping --

fn flow_response(db: &Database, flow: Flow) -> CoreResult<FlowResponse> {
    let published_version = versioning::get_active_version(db, flow.id)?.map(|v| v.version);
    Ok(FlowResponse {
        id: flow.id,
        name: flow.name,
        description: flow.description,
        created_by: flow.created_by,
        is_active: flow.is_active,
        sequential: flow.settings.sequential,
        allow_self_pause: flow.settings.allow_self_pause,
        published_version,
        created_at: flow.created_at,
        updated_at: flow.updated_at,
    })
}

fn step_response(step: FlowStep, components: Vec<Component>) -> StepResponse {
    StepResponse {
        id: step.id,
        title: step.title,
        description: step.description,
        rank: step.rank.to_string(),
        required: step.required,
        components: components.into_iter().map(component_response).collect(),
    }
}

fn component_response(component: Component) -> ComponentResponse {
    ComponentResponse {
        id: component.id,
        title: component.title,
        rank: component.rank.to_string(),
        required: component.required,
        payload: component.payload,
    }
}

fn version_response(version: FlowVersion) -> VersionResponse {
    VersionResponse {
        id: version.id,
        version: version.version,
        is_active: version.is_active,
        created_at: version.created_at,
    }
}
