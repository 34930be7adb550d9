use super::*;
use plotgrid_engine::permissions::ADMIN_BYPASS;
use uuid::Uuid;

fn temp_state() -> (Arc<AppState>, Arc<GrantTable>) {
    let config = PlotConfig::default();
    let store = Arc::new(SqliteStore::new(std::env::temp_dir().join(format!(
        "plotgrid-server-test-{}.db",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    ))));
    let grants = Arc::new(GrantTable::new());
    let state = AppState::open(&config, store, grants.clone()).expect("open state");
    (Arc::new(state), grants)
}

fn lobby() -> Location {
    Location {
        world: "lobby".to_string(),
        position: Vec3 {
            x: 0.5,
            y: 80.0,
            z: 0.5,
        },
        yaw: 0.0,
        pitch: 0.0,
    }
}

fn origin() -> GridRef {
    GridRef { x: 0, z: 0 }
}

fn block(actor: ActorId, x: i32, y: i32, z: i32) -> BlockEvent {
    BlockEvent {
        actor,
        world: None,
        x,
        y,
        z,
    }
}

#[tokio::test]
async fn claim_then_modify_verdicts() {
    let (state, grants) = temp_state();
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let admin = Uuid::new_v4();
    grants.grant(admin, ADMIN_BYPASS);

    let Json(info) = plots_claim(
        State(state.clone()),
        Json(ClaimRequest {
            actor: owner,
            plot: None,
            position: Some(Vec3 {
                x: 10.5,
                y: 65.0,
                z: 10.5,
            }),
            world: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(info.id, origin());
    assert_eq!(info.owner, Some(owner));

    let Json(v) = event_modify(State(state.clone()), Json(block(owner, 10, 65, 10))).await;
    assert!(v.allowed);
    let Json(v) = event_modify(State(state.clone()), Json(block(stranger, 10, 65, 10))).await;
    assert_eq!(v.reason.as_deref(), Some("not_permitted"));
    let Json(v) = event_modify(State(state.clone()), Json(block(owner, 10, 1, 10))).await;
    assert_eq!(v.reason.as_deref(), Some("bottom_layer"));
    let Json(v) = event_modify(State(state.clone()), Json(block(owner, 2, 65, 10))).await;
    assert_eq!(v.reason.as_deref(), Some("road"));
    let Json(v) = event_modify(State(state), Json(block(admin, 10, 1, 10))).await;
    assert!(v.allowed);
}

#[tokio::test]
async fn plot_errors_map_to_statuses() {
    let (state, _) = temp_state();
    let owner = Uuid::new_v4();

    let err = plots_claim(
        State(state.clone()),
        Json(ClaimRequest {
            actor: owner,
            plot: None,
            position: Some(Vec3 {
                x: 2.0,
                y: 65.0,
                z: 10.0,
            }),
            world: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err.code(), codes::INVALID_POSITION);

    let req = || ClaimRequest {
        actor: owner,
        plot: Some(origin()),
        position: None,
        world: None,
    };
    plots_claim(State(state.clone()), Json(req())).await.unwrap();
    let err = plots_claim(State(state.clone()), Json(req())).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(err.code(), codes::ALREADY_CLAIMED);

    let err = plots_auto(State(state.clone()), Json(ActorRequest { actor: owner }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::AT_LIMIT);

    let err = plots_unclaim(State(state.clone()), Json(PlotRequest { plot: GridRef { x: 9, z: 9 } }))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    let err = plots_claim(
        State(state),
        Json(ClaimRequest {
            actor: owner,
            plot: None,
            position: None,
            world: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn membership_round_trip() {
    let (state, _) = temp_state();
    let owner = Uuid::new_v4();
    let friend = Uuid::new_v4();
    plots_claim(
        State(state.clone()),
        Json(ClaimRequest {
            actor: owner,
            plot: Some(origin()),
            position: None,
            world: None,
        }),
    )
    .await
    .unwrap();

    let member = |trust: Option<&str>| MemberRequest {
        plot: origin(),
        actor: friend,
        trust: trust.map(str::to_string),
    };
    let err = members_add(State(state.clone()), Json(member(Some("owner"))))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let Json(r) = members_add(State(state.clone()), Json(member(Some("helper")))).await.unwrap();
    assert!(r.changed);
    let Json(v) = event_interact(State(state.clone()), Json(block(friend, 10, 65, 10))).await;
    assert!(!v.allowed);

    let Json(r) = plots_deny(State(state.clone()), Json(member(None))).await.unwrap();
    assert!(r.changed);
    let Json(info) = plot_get(State(state.clone()), Path("0;0".to_string())).await.unwrap();
    assert!(info.members.is_empty());
    assert_eq!(info.denied, vec![friend]);

    let Json(r) = plots_undeny(State(state.clone()), Json(member(None))).await.unwrap();
    assert!(r.changed);
    let Json(r) = members_add(State(state.clone()), Json(member(None))).await.unwrap();
    assert!(r.changed);
    let Json(info) = plot_get(State(state.clone()), Path("0;0".to_string())).await.unwrap();
    assert_eq!(info.members[0].trust, "TRUSTED");

    let err = plot_get(State(state), Path("zero".to_string())).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn move_events_report_entry_messages() {
    let (state, _) = temp_state();
    let owner = Uuid::new_v4();
    let walker = Uuid::new_v4();
    state.directory.claim(PlotId::ORIGIN, owner).unwrap();
    let mut settings = state.directory.get(PlotId::ORIGIN).unwrap().settings;
    settings.entry_message = Some("welcome".to_string());
    state.directory.update_settings(PlotId::ORIGIN, settings).unwrap();

    let mv = |x: f64, z: f64| MoveEvent {
        actor: walker,
        world: None,
        x,
        z,
    };
    let Json(t) = event_move(State(state.clone()), Json(mv(2.0, 10.0))).await;
    assert!(!t.changed);
    let Json(t) = event_move(State(state.clone()), Json(mv(10.2, 10.9))).await;
    assert!(t.changed);
    assert_eq!(t.entered, Some(origin()));
    assert_eq!(t.entry_message.as_deref(), Some("welcome"));
    let Json(t) = event_move(State(state.clone()), Json(mv(11.0, 11.0))).await;
    assert!(!t.changed);

    let Json(r) = event_disconnect(State(state.clone()), Json(ActorRequest { actor: walker })).await;
    assert!(r.changed);
    let Json(r) = event_disconnect(State(state), Json(ActorRequest { actor: walker })).await;
    assert!(!r.changed);
}

#[tokio::test]
async fn teleport_home_and_back() {
    let (state, _) = temp_state();
    let owner = Uuid::new_v4();
    let guest = Uuid::new_v4();

    let err = teleport_home(
        State(state.clone()),
        Json(HomeRequest {
            actor: owner,
            index: None,
            from: lobby(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), codes::NO_HOME);

    let Json(info) = plots_auto(State(state.clone()), Json(ActorRequest { actor: owner }))
        .await
        .unwrap();
    assert_eq!(info.id, origin());

    let Json(t) = teleport_home(
        State(state.clone()),
        Json(HomeRequest {
            actor: owner,
            index: Some(3),
            from: lobby(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(t.world, "plotworld");
    assert_eq!(t.position, Vec3 { x: 21.0, y: 65.0, z: 21.0 });

    let Json(back) = teleport_back(State(state.clone()), Json(ActorRequest { actor: owner }))
        .await
        .unwrap();
    assert_eq!(back.world, "lobby");

    state.directory.deny(PlotId::ORIGIN, guest).unwrap();
    let err = teleport_visit(
        State(state.clone()),
        Json(VisitRequest {
            actor: guest,
            plot: None,
            owner: Some(owner),
            from: lobby(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let err = teleport_back(State(state), Json(ActorRequest { actor: guest }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::NO_LAST_LOCATION);
}

#[tokio::test]
async fn admin_claim_and_transfer() {
    let (state, _) = temp_state();
    let owner = Uuid::new_v4();
    let Json(info) = plots_admin_claim(State(state.clone()), Json(PlotRequest { plot: GridRef { x: 2, z: 2 } }))
        .await
        .unwrap();
    assert_eq!(info.owner, None);

    let Json(r) = plots_transfer(
        State(state.clone()),
        Json(TransferRequest {
            plot: GridRef { x: 2, z: 2 },
            new_owner: owner,
        }),
    )
    .await
    .unwrap();
    assert!(r.changed);
    let Json(plots) = player_plots(State(state), Path(owner)).await;
    assert_eq!(plots.len(), 1);
    assert_eq!(plots[0].id, GridRef { x: 2, z: 2 });
}

#[tokio::test]
async fn other_worlds_are_outside_plot_rules() {
    let (state, _) = temp_state();
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    state.directory.claim(PlotId::ORIGIN, owner).unwrap();

    let in_world = |actor: ActorId, world: Option<&str>, x: i32, y: i32| BlockEvent {
        actor,
        world: world.map(str::to_string),
        x,
        y,
        z: 10,
    };
    // Road, bottom layer and someone else's plot, all in the lobby.
    for (x, y) in [(2, 65), (10, 1), (10, 65)] {
        let Json(v) = event_modify(State(state.clone()), Json(in_world(stranger, Some("lobby"), x, y))).await;
        assert_eq!(v, Verdict::allow());
        let Json(v) = event_interact(State(state.clone()), Json(in_world(stranger, Some("lobby"), x, y))).await;
        assert!(v.allowed);
    }
    let Json(v) = event_modify(State(state.clone()), Json(in_world(stranger, Some("plotworld"), 10, 65))).await;
    assert_eq!(v.reason.as_deref(), Some("not_permitted"));
    let Json(v) = event_modify(State(state.clone()), Json(in_world(stranger, None, 2, 65))).await;
    assert_eq!(v.reason.as_deref(), Some("road"));

    let err = plots_claim(
        State(state.clone()),
        Json(ClaimRequest {
            actor: stranger,
            plot: None,
            position: Some(Vec3 {
                x: 50.0,
                y: 65.0,
                z: 10.0,
            }),
            world: Some("lobby".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), codes::INVALID_POSITION);
    assert_eq!(state.directory.plot_count_for(stranger), 0);
}

#[tokio::test]
async fn moving_to_another_world_leaves_the_plot() {
    let (state, _) = temp_state();
    let walker = Uuid::new_v4();
    let mv = |world: &str, x: f64, z: f64| MoveEvent {
        actor: walker,
        world: Some(world.to_string()),
        x,
        z,
    };

    let Json(t) = event_move(State(state.clone()), Json(mv("lobby", 10.0, 10.0))).await;
    assert!(!t.changed);
    assert!(state.presence.current(walker).is_none());

    let Json(t) = event_move(State(state.clone()), Json(mv("plotworld", 10.0, 10.0))).await;
    assert_eq!(t.entered, Some(origin()));
    let Json(t) = event_move(State(state.clone()), Json(mv("lobby", 10.0, 10.0))).await;
    assert!(t.changed);
    assert_eq!(t.left, Some(origin()));
    assert_eq!(t.entered, None);
    assert!(state.presence.current(walker).is_none());

    let Json(t) = event_move(State(state), Json(mv("plotworld", 10.0, 10.0))).await;
    assert_eq!(t.entered, Some(origin()));
}

#[test]
fn loopback_only() {
    assert!(is_allowed_peer_ip("127.0.0.1".parse().unwrap()));
    assert!(is_allowed_peer_ip("::1".parse().unwrap()));
    assert!(is_allowed_peer_ip("::ffff:127.0.0.1".parse().unwrap()));
    assert!(!is_allowed_peer_ip("100.64.0.1".parse().unwrap()));
    assert!(!is_allowed_peer_ip("192.168.1.10".parse().unwrap()));
}

async fn exchange(request: &[u8]) -> String {
    let (state, _) = temp_state();
    let state = Arc::try_unwrap(state).ok().expect("sole owner");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(listener, state, async {
        let _ = rx.await;
    }));

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut buf = String::new();
    stream.read_to_string(&mut buf).await.unwrap();

    let _ = tx.send(());
    assert_eq!(server.await.unwrap().unwrap(), addr);
    buf
}

#[tokio::test]
async fn serve_listener_answers_health() {
    let buf = exchange(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(buf.starts_with("HTTP/1.1 200"));
    assert!(buf.ends_with("ok"));
}

#[tokio::test]
async fn browser_preflight_gets_no_cors_grant() {
    let buf = exchange(
        b"OPTIONS /api/plots/claim HTTP/1.1\r\nHost: localhost\r\nOrigin: http://localhost:5173\r\n\
Access-Control-Request-Method: POST\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(buf.starts_with("HTTP/1.1 405"));
    assert!(!buf.to_ascii_lowercase().contains("access-control-allow-origin"));
}
