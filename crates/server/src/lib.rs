use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use plotgrid_engine::{
    model::format_timestamp_ms, ActorId, GrantTable, LastLocations, ModifyVerdict, PermissionGate,
    PermissionOracle, Plot, PlotConfig, PlotDirectory, PlotError, PlotId, PlotTransition, Position,
    PresenceTracker, Protection, SqliteStore, TeleportTarget, Teleports, TrustLevel, Whereabouts,
};
use plotgrid_protocol::{
    codes, ActorRequest, ApiError, BlockEvent, ChangeReply, ClaimRequest, GridRef, HomeRequest,
    Location, MemberInfo, MemberRequest, MoveEvent, PlotInfo, PlotRequest, TeleportReply,
    TransferRequest, Transition, Vec3, Verdict, VisitRequest,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

pub struct AppState {
    /// Events from any other world are outside plot rules.
    pub plot_world: String,
    pub directory: Arc<PlotDirectory>,
    pub protection: Protection,
    pub presence: PresenceTracker,
    pub teleports: Teleports,
}

impl AppState {
    /// Wires the engine around one SQLite store and loads every stored plot.
    /// A load failure aborts startup.
    pub fn open(
        config: &PlotConfig,
        store: Arc<SqliteStore>,
        oracle: Arc<dyn PermissionOracle>,
    ) -> anyhow::Result<Self> {
        store.open()?;
        let gate = PermissionGate::new(oracle);
        let directory = Arc::new(PlotDirectory::new(
            store.clone(),
            gate.clone(),
            config.limit_tiers(),
            config.layout(),
            config.auto_search_radius,
        ));
        directory.load()?;

        let protection = Protection::new(config.protection_rules(), directory.clone(), gate);
        let locations = Arc::new(LastLocations::new(store));
        let teleports = Teleports::new(
            directory.clone(),
            protection.clone(),
            locations,
            config.world_name.clone(),
            config.ground_height,
        );
        Ok(Self {
            plot_world: config.world_name.clone(),
            presence: PresenceTracker::new(config.layout()),
            directory,
            protection,
            teleports,
        })
    }

    /// A missing world is taken to be the plot world.
    pub fn in_plot_world(&self, world: Option<&str>) -> bool {
        world.map_or(true, |w| w == self.plot_world)
    }

    /// Same as [`AppState::open`] with the config's static grants as oracle.
    pub fn from_config(config: &PlotConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::new(config.database.path.clone()));
        let grants = Arc::new(GrantTable::from_map(&config.grants));
        Self::open(config, store, grants)
    }
}

type Shared = State<Arc<AppState>>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/events/modify", post(event_modify))
        .route("/api/events/interact", post(event_interact))
        .route("/api/events/move", post(event_move))
        .route("/api/events/disconnect", post(event_disconnect))
        .route("/api/plots/claim", post(plots_claim))
        .route("/api/plots/auto", post(plots_auto))
        .route("/api/plots/unclaim", post(plots_unclaim))
        .route("/api/plots/admin-claim", post(plots_admin_claim))
        .route("/api/plots/transfer", post(plots_transfer))
        .route("/api/plots/members/add", post(members_add))
        .route("/api/plots/members/remove", post(members_remove))
        .route("/api/plots/deny", post(plots_deny))
        .route("/api/plots/undeny", post(plots_undeny))
        .route("/api/plots/{id}", get(plot_get))
        .route("/api/players/{actor}/plots", get(player_plots))
        .route("/api/teleport/home", post(teleport_home))
        .route("/api/teleport/visit", post(teleport_visit))
        .route("/api/teleport/back", post(teleport_back))
        .with_state(Arc::new(state))
        // The host engine talks to us over loopback only.
        .layer(middleware::from_fn(ip_allowlist))
}

/// Error body plus status, for handlers that return `Result`.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    body: ApiError,
}

impl ApiFailure {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiError::new(codes::BAD_REQUEST, message),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.body.code
    }
}

impl From<PlotError> for ApiFailure {
    fn from(err: PlotError) -> Self {
        let (status, code) = match err {
            PlotError::InvalidPosition { .. } => (StatusCode::UNPROCESSABLE_ENTITY, codes::INVALID_POSITION),
            PlotError::AlreadyClaimed(_) => (StatusCode::CONFLICT, codes::ALREADY_CLAIMED),
            PlotError::AtLimit { .. } => (StatusCode::CONFLICT, codes::AT_LIMIT),
            PlotError::NotFound(_) => (StatusCode::NOT_FOUND, codes::NOT_FOUND),
            PlotError::Denied(_) => (StatusCode::FORBIDDEN, codes::DENIED),
            PlotError::NoUnclaimedPlot => (StatusCode::CONFLICT, codes::NO_UNCLAIMED_PLOT),
            PlotError::NoHome => (StatusCode::NOT_FOUND, codes::NO_HOME),
            PlotError::NoLastLocation => (StatusCode::NOT_FOUND, codes::NO_LAST_LOCATION),
        };
        Self {
            status,
            body: ApiError::new(code, err.to_string()),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiFailure>;

fn grid_ref(id: PlotId) -> GridRef {
    GridRef { x: id.x, z: id.z }
}

fn plot_id(r: GridRef) -> PlotId {
    PlotId::new(r.x, r.z)
}

fn vec3(p: Position) -> Vec3 {
    Vec3 {
        x: p.x,
        y: p.y,
        z: p.z,
    }
}

fn position(v: Vec3) -> Position {
    Position::new(v.x, v.y, v.z)
}

fn whereabouts(l: Location) -> Whereabouts {
    Whereabouts {
        world: l.world,
        position: position(l.position),
        yaw: l.yaw,
        pitch: l.pitch,
    }
}

fn plot_info(plot: &Plot) -> PlotInfo {
    PlotInfo {
        id: grid_ref(plot.id),
        owner: plot.owner,
        alias: plot.alias.clone(),
        members: plot
            .members()
            .map(|m| MemberInfo {
                id: m.id,
                trust: m.trust.to_string(),
                added_at: format_timestamp_ms(m.added_at_ms),
            })
            .collect(),
        denied: plot.denied().collect(),
        home: plot.home.map(vec3),
        merged_with: plot.merged_with.iter().copied().map(grid_ref).collect(),
        created_at: format_timestamp_ms(plot.created_at_ms()),
        last_activity: format_timestamp_ms(plot.last_activity_ms()),
    }
}

fn teleport_reply(t: TeleportTarget) -> TeleportReply {
    TeleportReply {
        plot: t.plot.map(grid_ref),
        world: t.world,
        position: vec3(t.position),
        yaw: t.yaw,
        pitch: t.pitch,
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn event_modify(State(state): Shared, Json(ev): Json<BlockEvent>) -> Json<Verdict> {
    if !state.in_plot_world(ev.world.as_deref()) {
        return Json(Verdict::allow());
    }
    let verdict = match state.protection.check_modify(ev.actor, ev.x, ev.y, ev.z) {
        ModifyVerdict::Allow => Verdict::allow(),
        ModifyVerdict::Deny(reason) => {
            tracing::debug!(actor = %ev.actor, x = ev.x, y = ev.y, z = ev.z, reason = reason.as_str(), "modify denied");
            Verdict::deny(reason.as_str(), reason.message())
        }
    };
    Json(verdict)
}

async fn event_interact(State(state): Shared, Json(ev): Json<BlockEvent>) -> Json<Verdict> {
    if !state.in_plot_world(ev.world.as_deref())
        || state.protection.can_interact(ev.actor, ev.x, ev.y, ev.z)
    {
        Json(Verdict::allow())
    } else {
        Json(Verdict::deny("no_container_access", "You cannot interact with that here."))
    }
}

async fn event_move(State(state): Shared, Json(ev): Json<MoveEvent>) -> Json<Transition> {
    let t = if state.in_plot_world(ev.world.as_deref()) {
        let (x, z) = Position::new(ev.x, 0.0, ev.z).column();
        state.presence.on_move(ev.actor, x, z)
    } else {
        // Leaving the plot world leaves whatever plot the actor stood on.
        state.presence.forget(ev.actor).map(|left| PlotTransition {
            left: Some(left),
            entered: None,
        })
    };
    let Some(t) = t else {
        return Json(Transition::default());
    };
    let message = |id: Option<PlotId>, pick: fn(&Plot) -> Option<String>| {
        id.and_then(|id| state.directory.with_plot(id, pick).flatten())
    };
    Json(Transition {
        changed: true,
        left: t.left.map(grid_ref),
        entered: t.entered.map(grid_ref),
        exit_message: message(t.left, |p| p.settings.exit_message.clone()),
        entry_message: message(t.entered, |p| p.settings.entry_message.clone()),
    })
}

async fn event_disconnect(State(state): Shared, Json(req): Json<ActorRequest>) -> Json<ChangeReply> {
    Json(ChangeReply {
        changed: state.presence.forget(req.actor).is_some(),
    })
}

async fn plots_claim(State(state): Shared, Json(req): Json<ClaimRequest>) -> ApiResult<PlotInfo> {
    let plot = match (req.plot, req.position) {
        (Some(plot), _) => state.directory.claim(plot_id(plot), req.actor)?,
        (None, Some(pos)) => {
            let (x, z) = position(pos).column();
            if !state.in_plot_world(req.world.as_deref()) {
                return Err(PlotError::InvalidPosition { x, z }.into());
            }
            state.directory.claim_at(x, z, req.actor)?
        }
        (None, None) => return Err(ApiFailure::bad_request("claim needs a plot or a position")),
    };
    Ok(Json(plot_info(&plot)))
}

async fn plots_auto(State(state): Shared, Json(req): Json<ActorRequest>) -> ApiResult<PlotInfo> {
    let plot = state.directory.auto_claim(req.actor)?;
    Ok(Json(plot_info(&plot)))
}

async fn plots_unclaim(State(state): Shared, Json(req): Json<PlotRequest>) -> ApiResult<PlotInfo> {
    let plot = state.directory.unclaim(plot_id(req.plot))?;
    Ok(Json(plot_info(&plot)))
}

async fn plots_admin_claim(State(state): Shared, Json(req): Json<PlotRequest>) -> ApiResult<PlotInfo> {
    let plot = state.directory.claim_admin(plot_id(req.plot))?;
    Ok(Json(plot_info(&plot)))
}

async fn plots_transfer(State(state): Shared, Json(req): Json<TransferRequest>) -> ApiResult<ChangeReply> {
    let changed = state.directory.transfer(plot_id(req.plot), req.new_owner)?;
    Ok(Json(ChangeReply { changed }))
}

async fn members_add(State(state): Shared, Json(req): Json<MemberRequest>) -> ApiResult<ChangeReply> {
    let trust = match req.trust.as_deref() {
        None => TrustLevel::Trusted,
        Some(raw) => raw
            .parse::<TrustLevel>()
            .map_err(|err| ApiFailure::bad_request(err.to_string()))?,
    };
    let changed = state.directory.add_member(plot_id(req.plot), req.actor, trust)?;
    Ok(Json(ChangeReply { changed }))
}

async fn members_remove(State(state): Shared, Json(req): Json<MemberRequest>) -> ApiResult<ChangeReply> {
    let changed = state.directory.remove_member(plot_id(req.plot), req.actor)?;
    Ok(Json(ChangeReply { changed }))
}

async fn plots_deny(State(state): Shared, Json(req): Json<MemberRequest>) -> ApiResult<ChangeReply> {
    let changed = state.directory.deny(plot_id(req.plot), req.actor)?;
    Ok(Json(ChangeReply { changed }))
}

async fn plots_undeny(State(state): Shared, Json(req): Json<MemberRequest>) -> ApiResult<ChangeReply> {
    let changed = state.directory.undeny(plot_id(req.plot), req.actor)?;
    Ok(Json(ChangeReply { changed }))
}

async fn plot_get(State(state): Shared, Path(id): Path<String>) -> ApiResult<PlotInfo> {
    let id: PlotId = id
        .parse()
        .map_err(|err: plotgrid_engine::error::ParsePlotIdError| ApiFailure::bad_request(err.to_string()))?;
    let plot = state.directory.get(id).ok_or(PlotError::NotFound(id))?;
    Ok(Json(plot_info(&plot)))
}

async fn player_plots(State(state): Shared, Path(actor): Path<ActorId>) -> Json<Vec<PlotInfo>> {
    Json(state.directory.plots_for(actor).iter().map(plot_info).collect())
}

async fn teleport_home(State(state): Shared, Json(req): Json<HomeRequest>) -> ApiResult<TeleportReply> {
    let target = state
        .teleports
        .home(req.actor, req.index, whereabouts(req.from))?;
    Ok(Json(teleport_reply(target)))
}

async fn teleport_visit(State(state): Shared, Json(req): Json<VisitRequest>) -> ApiResult<TeleportReply> {
    let from = whereabouts(req.from);
    let target = match (req.plot, req.owner) {
        (Some(plot), _) => state.teleports.visit(req.actor, plot_id(plot), from)?,
        (None, Some(owner)) => state.teleports.visit_owner(req.actor, owner, from)?,
        (None, None) => return Err(ApiFailure::bad_request("visit needs a plot or an owner")),
    };
    Ok(Json(teleport_reply(target)))
}

async fn teleport_back(State(state): Shared, Json(req): Json<ActorRequest>) -> ApiResult<TeleportReply> {
    let target = state.teleports.back(req.actor)?;
    Ok(Json(teleport_reply(target)))
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "plotgrid adapter listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if is_allowed_peer_ip(peer.ip()) {
        return next.run(req).await;
    }
    tracing::warn!(%peer, "rejected non-loopback peer");
    (
        StatusCode::FORBIDDEN,
        Json(ApiError::new(codes::FORBIDDEN, "loopback only")),
    )
        .into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(v6.is_loopback(), |v4| v4.is_loopback()),
        IpAddr::V4(v4) => v4.is_loopback(),
    }
}

#[cfg(test)]
mod tests;
