mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use helpers::{
    ADMIN_ADDRESS, create_company, create_user, delete_json, get_json, patch_json, post_json,
    signed, test_address, test_router, test_state,
};

#[tokio::test]
async fn company_creation_is_admin_only() {
    let state = test_state().await;
    let pool = state.pool.clone();
    let app = test_router(state);

    let (status, body) = post_json(
        &app,
        ADMIN_ADDRESS,
        "/company/",
        json!({ "role": "auditor", "name": "Sharp Auditors" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    assert_eq!(body["role"], "auditor");
    assert_eq!(body["name"], "Sharp Auditors");

    let addr = test_address(0x1c);
    create_user(&pool, "client", "carol", &addr, None).await;
    let (status, _) = post_json(
        &app,
        &addr,
        "/company/",
        json!({ "role": "client", "name": "Acme Protocol" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Names outside 3..=25 characters are refused.
    let (status, _) = post_json(
        &app,
        ADMIN_ADDRESS,
        "/company/",
        json!({ "role": "client", "name": "ab" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn membership_and_manager_lifecycle() {
    let state = test_state().await;
    let pool = state.pool.clone();
    let app = test_router(state);

    let company = create_company(&pool, "auditor", "Sharp Auditors").await;
    let alice = create_user(&pool, "auditor", "alice", &test_address(1), None).await;
    let bob = create_user(&pool, "auditor", "bob", &test_address(2), None).await;

    // Manager promotion requires membership first.
    let (status, _) = post_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{company}/managers"),
        json!({ "userId": alice }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{company}/users"),
        json!({ "userId": alice }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "assign failed: {body}");
    assert_eq!(body["companyId"], json!(company));

    // Re-assigning the same member conflicts.
    let (status, _) = post_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{company}/users"),
        json!({ "userId": alice }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{company}/managers"),
        json!({ "userId": alice }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // A manager can manage membership without being an admin.
    let alice_addr = test_address(1);
    let (status, _) = post_json(
        &app,
        &alice_addr,
        &format!("/company/{company}/users"),
        json!({ "userId": bob }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A client-role user cannot join an auditor company.
    let dave = create_user(&pool, "client", "dave", &test_address(4), None).await;
    let (status, _) = post_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{company}/users"),
        json!({ "userId": dave }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A plain member cannot.
    let bob_addr = test_address(2);
    let carol = create_user(&pool, "auditor", "carol", &test_address(3), None).await;
    let (status, _) = post_json(
        &app,
        &bob_addr,
        &format!("/company/{company}/users"),
        json!({ "userId": carol }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Relations show up on the company view.
    let (status, body) = get_json(&app, &bob_addr, &format!("/company/{company}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["managerIds"], json!([alice]));
    assert_eq!(body["memberIds"].as_array().unwrap().len(), 2);
    assert_eq!(body["reportIds"], json!([]));

    // Removing a member also drops their manager seat.
    let (status, _) = delete_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{company}/users/{alice}"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = get_json(&app, &bob_addr, &format!("/company/{company}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["managerIds"], json!([]));
    assert_eq!(body["memberIds"], json!([bob]));
}

#[tokio::test]
async fn admin_users_cannot_join_companies() {
    let state = test_state().await;
    let pool = state.pool.clone();
    let app = test_router(state);

    let company = create_company(&pool, "client", "Acme Protocol").await;
    let (status, body) = get_json(&app, ADMIN_ADDRESS, "/user/").await;
    assert_eq!(status, StatusCode::OK);
    let admin_id = body[0]["id"].as_str().unwrap().to_owned();

    let (status, _) = post_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{company}/users"),
        json!({ "userId": admin_id }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn company_deletion_is_guarded_by_workflow_state() {
    let state = test_state().await;
    let pool = state.pool.clone();
    let app = test_router(state);

    let client_company = create_company(&pool, "client", "Acme Protocol").await;
    let auditor_company = create_company(&pool, "auditor", "Sharp Auditors").await;
    let client_addr = test_address(0x1c);
    let auditor_addr = test_address(0x2a);
    create_user(&pool, "client", "carol", &client_addr, Some(client_company)).await;
    create_user(&pool, "auditor", "alice", &auditor_addr, Some(auditor_company)).await;

    let (status, body) = post_json(
        &app,
        "",
        "/scope/create",
        signed(
            json!({
                "scopeData": {
                    "protocol": "Vault",
                    "auditorCompanyId": auditor_company,
                },
            }),
            &client_addr,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create scope failed: {body}");
    let scope_id = body["scope"]["id"].as_str().unwrap().to_owned();

    // Both parties are pinned while the scope is pending.
    for company in [client_company, auditor_company] {
        let (status, _) = delete_json(&app, ADMIN_ADDRESS, &format!("/company/{company}")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    // Settle the scope; the companies keep their audit history and still
    // cannot be deleted.
    let (status, _) = post_json(
        &app,
        "",
        &format!("/scope/{scope_id}/approve"),
        signed(json!({}), &auditor_addr),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = delete_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/company/{client_company}"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A company with no workflow history deletes cleanly.
    let idle = create_company(&pool, "client", "Idle Industries").await;
    let (status, _) = delete_json(&app, ADMIN_ADDRESS, &format!("/company/{idle}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get_json(&app, ADMIN_ADDRESS, &format!("/company/{idle}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn self_registration_checks_the_signature_and_role() {
    let state = test_state().await;
    let pool = state.pool.clone();
    let app = test_router(state);

    let company = create_company(&pool, "auditor", "Sharp Auditors").await;
    let addr = test_address(0xb0b);

    // Admin self-registration is never allowed.
    let (status, _) = post_json(
        &app,
        "",
        "/user/",
        signed(
            json!({ "role": "admin", "name": "bob", "publicAddress": addr }),
            &addr,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A signing account that disagrees with the claimed address is refused.
    let (status, _) = post_json(
        &app,
        "",
        "/user/",
        json!({
            "role": "auditor",
            "name": "bob",
            "publicAddress": addr,
            "signedMessage": ["0x1", "0x2"],
            "account": test_address(0xbad),
            "signData": "0xdead",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A nonexistent company is refused.
    let (status, _) = post_json(
        &app,
        "",
        "/user/",
        signed(
            json!({
                "role": "auditor",
                "name": "bob",
                "publicAddress": addr,
                "companyId": uuid::Uuid::new_v4(),
            }),
            &addr,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // So is a company of the other role.
    let client_company = create_company(&pool, "client", "Acme Protocol").await;
    let (status, _) = post_json(
        &app,
        "",
        "/user/",
        signed(
            json!({
                "role": "auditor",
                "name": "bob",
                "publicAddress": addr,
                "companyId": client_company,
            }),
            &addr,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &app,
        "",
        "/user/",
        signed(
            json!({
                "role": "auditor",
                "name": "bob",
                "publicAddress": addr,
                "companyId": company,
            }),
            &addr,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "registration failed: {body}");
    assert_eq!(body["role"], "auditor");
    assert_eq!(body["companyId"], json!(company));

    // The same address cannot register twice.
    let (status, _) = post_json(
        &app,
        "",
        "/user/",
        signed(
            json!({ "role": "auditor", "name": "bob2", "publicAddress": addr }),
            &addr,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The fresh wallet can look itself up without authenticating.
    let (status, body) = get_json(&app, "", &format!("/user/address/{addr}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "bob");
}

#[tokio::test]
async fn profile_updates_are_self_or_admin() {
    let state = test_state().await;
    let pool = state.pool.clone();
    let app = test_router(state);

    let alice_addr = test_address(1);
    let bob_addr = test_address(2);
    let alice = create_user(&pool, "auditor", "alice", &alice_addr, None).await;
    create_user(&pool, "auditor", "bob", &bob_addr, None).await;

    let (status, body) = patch_json(
        &app,
        &alice_addr,
        &format!("/user/{alice}"),
        json!({ "name": "alicia" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "alicia");

    let (status, _) = patch_json(
        &app,
        &bob_addr,
        &format!("/user/{alice}"),
        json!({ "name": "hijacked" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = patch_json(
        &app,
        ADMIN_ADDRESS,
        &format!("/user/{alice}"),
        json!({ "name": "alice" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "alice");

    // Deletion is admin-only.
    let (status, _) = delete_json(&app, &bob_addr, &format!("/user/{alice}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = delete_json(&app, ADMIN_ADDRESS, &format!("/user/{alice}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get_json(&app, &bob_addr, &format!("/user/{alice}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listings_filter_by_role() {
    let state = test_state().await;
    let pool = state.pool.clone();
    let app = test_router(state);

    create_company(&pool, "client", "Acme Protocol").await;
    create_company(&pool, "auditor", "Sharp Auditors").await;
    create_user(&pool, "client", "carol", &test_address(1), None).await;
    create_user(&pool, "auditor", "alice", &test_address(2), None).await;

    let (status, body) = get_json(&app, ADMIN_ADDRESS, "/company/?role=auditor").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "Sharp Auditors");

    let (status, body) = get_json(&app, ADMIN_ADDRESS, "/user/?role=client").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "carol");

    // Admins are listable too (the bootstrap user).
    let (status, body) = get_json(&app, ADMIN_ADDRESS, "/user/?role=admin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}
