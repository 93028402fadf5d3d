use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
    http::HeaderMap,
};

use crate::AppState;
use crate::handlers::client_meta;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::models::{
    Competition, CompetitionMatch, CompetitionQuery, CompetitionRegistration,
    CompetitionStatistics, CreateCompetitionRequest, DrawRequest, GroupQuery, NewSystemLog,
    RegisterCompetitionRequest, UpdateCompetitionRequest, UpdateMatchRequest,
};
use crate::utils::ApiResult;

#[utoipa::path(
    post,
    path = "/api/v1/competitions",
    request_body = CreateCompetitionRequest,
    responses(
        (status = 200, description = "Competition created", body = Competition),
        (status = 400, description = "Deadline must precede competition date"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn create_competition(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<CreateCompetitionRequest>,
) -> ApiResult<Json<Competition>> {
    let competition = state.competition_service.create(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "competition_create",
                format!("创建比赛 {}", competition.title),
            )
            .target("competition", competition.id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(competition))
}

#[utoipa::path(
    get,
    path = "/api/v1/competitions",
    params(CompetitionQuery),
    responses((status = 200, description = "Competitions", body = Vec<Competition>)),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn list_competitions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CompetitionQuery>,
) -> ApiResult<Json<Vec<Competition>>> {
    Ok(Json(state.competition_service.list(&query).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/competitions/statistics",
    responses((status = 200, description = "Competition statistics", body = CompetitionStatistics)),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn competition_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<CompetitionStatistics>> {
    Ok(Json(state.competition_service.statistics(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/competitions/registrations/my",
    responses((status = 200, description = "Registrations of the current student", body = Vec<CompetitionRegistration>)),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn my_registrations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<CompetitionRegistration>>> {
    Ok(Json(state.competition_service.my_registrations(&user).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/competitions/registrations/{id}/confirm",
    params(("id" = i64, Path, description = "Registration ID")),
    responses(
        (status = 200, description = "Registration confirmed", body = CompetitionRegistration),
        (status = 400, description = "Fee not paid yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn confirm_registration(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CompetitionRegistration>> {
    Ok(Json(state.competition_service.confirm_registration(&user, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/competitions/matches/{match_id}",
    params(("match_id" = i64, Path, description = "Match ID")),
    request_body = UpdateMatchRequest,
    responses(
        (status = 200, description = "Match updated", body = CompetitionMatch),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn update_match(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(match_id): Path<i64>,
    Json(req): Json<UpdateMatchRequest>,
) -> ApiResult<Json<CompetitionMatch>> {
    let result = state.competition_service.update_match(&user, match_id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "match_update", "录入比赛结果")
                .target("competition_match", match_id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/v1/competitions/{id}",
    params(("id" = i64, Path, description = "Competition ID")),
    responses(
        (status = 200, description = "Competition detail", body = Competition),
        (status = 404, description = "Competition not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn get_competition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Competition>> {
    Ok(Json(state.competition_service.get(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/competitions/{id}",
    params(("id" = i64, Path, description = "Competition ID")),
    request_body = UpdateCompetitionRequest,
    responses((status = 200, description = "Competition updated", body = Competition)),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn update_competition(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCompetitionRequest>,
) -> ApiResult<Json<Competition>> {
    let competition = state.competition_service.update(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "competition_update",
                format!("更新比赛 {}", competition.title),
            )
            .target("competition", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(competition))
}

/// 学员报名比赛
#[utoipa::path(
    post,
    path = "/api/v1/competitions/{id}/register",
    params(("id" = i64, Path, description = "Competition ID")),
    request_body = RegisterCompetitionRequest,
    responses(
        (status = 200, description = "Registered, fee payment pending", body = CompetitionRegistration),
        (status = 400, description = "Registration closed or full"),
        (status = 409, description = "Already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<RegisterCompetitionRequest>,
) -> ApiResult<Json<CompetitionRegistration>> {
    let registration = state.competition_service.register(&user, id, req.group_type).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "competition_register",
                format!("报名比赛 {} 组", req.group_type),
            )
            .target("competition", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(registration))
}

#[utoipa::path(
    get,
    path = "/api/v1/competitions/{id}/registrations",
    params(("id" = i64, Path, description = "Competition ID"), GroupQuery),
    responses((status = 200, description = "Registrations", body = Vec<CompetitionRegistration>)),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn registrations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Json<Vec<CompetitionRegistration>>> {
    Ok(Json(state.competition_service.registrations(id, query.group_type).await?))
}

/// 分组抽签
#[utoipa::path(
    post,
    path = "/api/v1/competitions/{id}/draw",
    params(("id" = i64, Path, description = "Competition ID")),
    request_body = DrawRequest,
    responses(
        (status = 200, description = "First round created", body = Vec<CompetitionMatch>),
        (status = 400, description = "Wrong status or too few entrants"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn draw(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<DrawRequest>,
) -> ApiResult<Json<Vec<CompetitionMatch>>> {
    let matches = state.competition_service.draw(&user, id, req.group_type).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "competition_draw",
                format!("{} 组抽签，生成 {} 场对阵", req.group_type, matches.len()),
            )
            .target("competition", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(matches))
}

#[utoipa::path(
    get,
    path = "/api/v1/competitions/{id}/matches",
    params(("id" = i64, Path, description = "Competition ID"), GroupQuery),
    responses((status = 200, description = "Matches ordered by round", body = Vec<CompetitionMatch>)),
    security(("bearer_auth" = [])),
    tag = "Competitions"
)]
pub async fn matches(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Json<Vec<CompetitionMatch>>> {
    Ok(Json(state.competition_service.matches(id, query.group_type).await?))
}
