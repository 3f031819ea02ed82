use std::sync::Arc;

use entgraph::{
    Client, Context, EntError, Order, Predicate, SqliteDriver, Step, Token, User,
    entity::{token, user},
    neighbors,
};

fn prepared_client() -> Client {
    let driver = SqliteDriver::open_in_memory().expect("driver");
    let client = Client::new(Arc::new(driver), Vec::new()).expect("client");
    client
        .schema()
        .create(&Context::background())
        .expect("schema");
    client
}

fn create_user(client: &Client, email: &str) -> User {
    client
        .user()
        .create()
        .set_email(email)
        .set_tenant("acme")
        .save(&Context::background())
        .expect("user")
}

fn create_token(client: &Client, owner: &User, value: &str) -> Token {
    client
        .token()
        .create()
        .set_value(value)
        .set_user(owner)
        .save(&Context::background())
        .expect("token")
}

#[test]
fn test_token_owner_and_user_tokens_resolve_both_ways() {
    let client = prepared_client();
    let ctx = Context::background();
    let u1 = create_user(&client, "u1@example.com");
    let t1 = create_token(&client, &u1, "t1");
    assert_eq!(t1.user_id, Some(u1.id));

    let owner = client
        .token()
        .query_user(&t1)
        .expect("step")
        .only(&ctx)
        .expect("owner");
    assert_eq!(owner, u1);

    let tokens = client
        .user()
        .query_tokens(&u1)
        .expect("step")
        .all(&ctx)
        .expect("tokens");
    assert_eq!(tokens, vec![t1]);
}

#[test]
fn test_inverse_traversal_returns_source() {
    let client = prepared_client();
    let ctx = Context::background();
    let u1 = create_user(&client, "u1@example.com");
    let u2 = create_user(&client, "u2@example.com");
    for value in ["a", "b", "c"] {
        create_token(&client, &u1, value);
    }
    create_token(&client, &u2, "d");

    let tokens = client
        .user()
        .query_tokens(&u1)
        .expect("step")
        .all(&ctx)
        .expect("tokens");
    assert_eq!(tokens.len(), 3);
    for token in &tokens {
        let back = client
            .token()
            .query_user(token)
            .expect("step")
            .all(&ctx)
            .expect("owner");
        assert_eq!(back, vec![u1.clone()]);
    }
}

#[test]
fn test_user_without_tokens_has_empty_neighbor_set() {
    let client = prepared_client();
    let ctx = Context::background();
    let lonely = create_user(&client, "lonely@example.com");
    let query = client.user().query_tokens(&lonely).expect("step");
    assert_eq!(query.clone().count(&ctx).expect("count"), 0);
    assert!(query.all(&ctx).expect("all").is_empty());
}

#[test]
fn test_neighbor_query_composes_with_filters_and_order() {
    let client = prepared_client();
    let ctx = Context::background();
    let owner = create_user(&client, "owner@example.com");
    for value in ["alpha", "beta", "gamma", "delta"] {
        create_token(&client, &owner, value);
    }
    let values: Vec<String> = client
        .user()
        .query_tokens(&owner)
        .expect("step")
        .filter(Predicate::not(token::value_eq("beta")))
        .order(Order::desc(token::FIELD_VALUE))
        .limit(2)
        .all(&ctx)
        .expect("tokens")
        .into_iter()
        .map(|token| token.value)
        .collect();
    assert_eq!(values, vec!["gamma", "delta"]);
}

#[test]
fn test_deleted_owner_leaves_token_without_neighbor() {
    let client = prepared_client();
    let ctx = Context::background();
    let owner = create_user(&client, "owner@example.com");
    let token = create_token(&client, &owner, "orphan");
    client.user().delete_one(&owner).exec(&ctx).expect("delete");

    let reread = client.token().get(&ctx, token.id).expect("token");
    assert_eq!(reread.user_id, None);
    let err = client
        .token()
        .query_user(&reread)
        .expect("step")
        .only(&ctx)
        .expect_err("no owner");
    assert!(err.is_not_found());
}

#[test]
fn test_query_edge_checks_target_type() {
    let client = prepared_client();
    let owner = create_user(&client, "owner@example.com");
    let err = client
        .user()
        .query_edge::<User>(&owner, user::EDGE_TOKENS)
        .expect_err("wrong target");
    assert!(matches!(err, EntError::InvalidInput(_)));
}

#[test]
fn test_unknown_edge_is_rejected() {
    let client = prepared_client();
    let owner = create_user(&client, "owner@example.com");
    let err = client
        .user()
        .query_edge::<Token>(&owner, "devices")
        .expect_err("unknown edge");
    assert!(matches!(
        err,
        EntError::UnknownEdge { ref entity, ref edge } if entity == "User" && edge == "devices"
    ));
}

#[test]
fn test_step_and_neighbors_build_selector() {
    let client = prepared_client();
    let owner = create_user(&client, "owner@example.com");
    let (step, edge) =
        Step::resolve(client.config().registry(), &owner, user::EDGE_TOKENS).expect("resolve");
    assert_eq!(edge.target, "Token");
    let selector = neighbors(&step).expect("selector");
    assert_eq!(selector.table, token::TABLE);
}

#[test]
fn test_has_edge_predicates() {
    let client = prepared_client();
    let ctx = Context::background();
    let with_tokens = create_user(&client, "with@example.com");
    create_user(&client, "without@example.com");
    create_token(&client, &with_tokens, "secret");

    let found = client
        .user()
        .query()
        .filter(user::has_tokens())
        .only(&ctx)
        .expect("has tokens");
    assert_eq!(found, with_tokens);

    let matched = client
        .user()
        .query()
        .filter(user::has_tokens_with(vec![token::value_eq("secret")]))
        .count(&ctx)
        .expect("count");
    assert_eq!(matched, 1);

    let unmatched = client
        .user()
        .query()
        .filter(user::has_tokens_with(vec![token::value_eq("other")]))
        .count(&ctx)
        .expect("count");
    assert_eq!(unmatched, 0);

    let owned = client
        .token()
        .query()
        .filter(token::has_user_with(vec![user::email_eq("with@example.com")]))
        .count(&ctx)
        .expect("count");
    assert_eq!(owned, 1);
    assert_eq!(
        client
            .token()
            .query()
            .filter(token::has_user())
            .count(&ctx)
            .expect("count"),
        1
    );
}

#[test]
fn test_token_requires_owner() {
    let client = prepared_client();
    let err = client
        .token()
        .create()
        .set_value("floating")
        .save(&Context::background())
        .expect_err("missing user");
    assert!(matches!(
        err,
        EntError::ValidationError { ref field, .. } if field == token::EDGE_USER
    ));
}

#[test]
fn test_required_edge_cannot_be_cleared() {
    let client = prepared_client();
    let owner = create_user(&client, "owner@example.com");
    let token = create_token(&client, &owner, "kept");
    let err = client
        .token()
        .update_one(&token)
        .clear_edge(token::EDGE_USER)
        .save(&Context::background())
        .expect_err("required");
    assert!(err.is_validation());
}

#[test]
fn test_reassigning_token_owner() {
    let client = prepared_client();
    let ctx = Context::background();
    let first = create_user(&client, "first@example.com");
    let second = create_user(&client, "second@example.com");
    let token = create_token(&client, &first, "moving");

    let moved = client
        .token()
        .update_one(&token)
        .set_user_id(second.id)
        .save(&ctx)
        .expect("move");
    assert_eq!(moved.user_id, Some(second.id));
    assert_eq!(
        client
            .user()
            .query_tokens(&second)
            .expect("step")
            .only_id(&ctx)
            .expect("token"),
        token.id
    );
    assert_eq!(
        client
            .user()
            .query_tokens(&first)
            .expect("step")
            .count(&ctx)
            .expect("count"),
        0
    );
}

#[test]
fn test_detached_tokens_can_be_attached_to_another_user() {
    let client = prepared_client();
    let ctx = Context::background();
    let first = create_user(&client, "first@example.com");
    let a = create_token(&client, &first, "a");
    let b = create_token(&client, &first, "b");

    client
        .user()
        .update_one(&first)
        .remove_token_ids([a.id, b.id])
        .save(&ctx)
        .expect("detach");
    assert_eq!(client.token().get(&ctx, a.id).expect("a").user_id, None);

    let second = client
        .user()
        .create()
        .set_email("second@example.com")
        .set_tenant("acme")
        .add_token_ids([a.id, b.id])
        .save(&ctx)
        .expect("attach on create");
    let ids = client
        .user()
        .query_tokens(&second)
        .expect("step")
        .ids(&ctx)
        .expect("ids");
    assert_eq!(ids, vec![a.id, b.id]);
}

#[test]
fn test_attaching_owned_token_fails_without_side_effects() {
    let client = prepared_client();
    let ctx = Context::background();
    let first = create_user(&client, "first@example.com");
    let owned = create_token(&client, &first, "owned");

    let err = client
        .user()
        .create()
        .set_email("thief@example.com")
        .set_tenant("acme")
        .add_token_ids([owned.id])
        .save(&ctx)
        .expect_err("already owned");
    assert!(matches!(err, EntError::InvalidInput(_)));
    assert!(
        !client
            .user()
            .query()
            .filter(user::email_eq("thief@example.com"))
            .exist(&ctx)
            .expect("exist")
    );
    assert_eq!(
        client.token().get(&ctx, owned.id).expect("token").user_id,
        Some(first.id)
    );
}

#[test]
fn test_clear_tokens_detaches_every_token() {
    let client = prepared_client();
    let ctx = Context::background();
    let owner = create_user(&client, "owner@example.com");
    create_token(&client, &owner, "a");
    create_token(&client, &owner, "b");
    client
        .user()
        .update_one(&owner)
        .clear_tokens()
        .save(&ctx)
        .expect("clear");
    assert_eq!(
        client
            .token()
            .query()
            .filter(token::has_user())
            .count(&ctx)
            .expect("count"),
        0
    );
}
