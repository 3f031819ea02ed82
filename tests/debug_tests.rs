use std::sync::Arc;

use entgraph::{Client, ClientOption, Context, Logger, SqliteDriver};
use parking_lot::Mutex;

fn recorder() -> (Logger, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let logger: Logger = Arc::new(move |line: &str| sink.lock().push(line.to_string()));
    (logger, lines)
}

fn prepared_client(options: Vec<ClientOption>) -> Client {
    let driver = SqliteDriver::open_in_memory().expect("driver");
    let client = Client::new(Arc::new(driver), options).expect("client");
    client
        .schema()
        .create(&Context::background())
        .expect("schema");
    client
}

#[test]
fn test_plain_client_logs_nothing() {
    let (logger, lines) = recorder();
    let client = prepared_client(vec![ClientOption::Log(logger)]);
    client
        .user()
        .query()
        .all(&Context::background())
        .expect("query");
    assert!(!client.config().is_debug());
    assert!(lines.lock().is_empty());
}

#[test]
fn test_debug_client_logs_each_statement_once() {
    let (logger, lines) = recorder();
    let client = prepared_client(vec![ClientOption::Log(logger)]);
    let debug = client.debug();
    assert!(debug.config().is_debug());
    debug
        .user()
        .query()
        .all(&Context::background())
        .expect("query");

    let lines = lines.lock();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("driver.query: query=SELECT"));
}

#[test]
fn test_debug_is_idempotent() {
    let (logger, lines) = recorder();
    let client = prepared_client(vec![ClientOption::Log(logger)]);
    let twice = client.debug().debug();
    twice
        .user()
        .create()
        .set_email("ada@example.com")
        .set_tenant("acme")
        .save(&Context::background())
        .expect("create");
    let lines = lines.lock();
    assert_eq!(lines.len(), 1, "{lines:?}");
    assert!(lines[0].starts_with("driver.exec: query=INSERT INTO"));
    assert!(lines[0].contains("ada@example.com"));
}

#[test]
fn test_debug_option_wraps_driver_at_construction() {
    let (logger, lines) = recorder();
    let driver = SqliteDriver::open_in_memory().expect("driver");
    let client = Client::new(
        Arc::new(driver),
        vec![ClientOption::Log(logger), ClientOption::Debug],
    )
    .expect("client");
    assert!(client.config().is_debug());
    client
        .schema()
        .create(&Context::background())
        .expect("schema");
    let logged = lines.lock().len();
    assert!(logged > 0);

    client
        .debug()
        .tenant()
        .query()
        .count(&Context::background())
        .expect("count");
    assert_eq!(lines.lock().len(), logged + 1);
}

#[test]
fn test_debug_transaction_logs_lifecycle() {
    let (logger, lines) = recorder();
    let client = prepared_client(vec![ClientOption::Log(logger)]).debug();
    let ctx = Context::background();
    let tx = client.tx(&ctx).expect("tx");
    tx.user()
        .create()
        .set_email("tx@example.com")
        .set_tenant("acme")
        .save(&ctx)
        .expect("create");
    tx.commit().expect("commit");

    let lines = lines.lock();
    assert_eq!(lines.len(), 3, "{lines:?}");
    assert!(lines[0].starts_with("driver.tx("));
    assert!(lines[0].ends_with("): started"));
    let id = &lines[0]["driver.tx(".len().."driver.tx(".len() + 8];
    assert!(lines[1].starts_with(&format!("tx({id}).exec: query=INSERT")));
    assert_eq!(lines[2], format!("tx({id}): committed"));
}

#[test]
fn test_debug_transaction_logs_rollback() {
    let (logger, lines) = recorder();
    let client = prepared_client(vec![ClientOption::Log(logger)]).debug();
    let tx = client.tx(&Context::background()).expect("tx");
    tx.rollback().expect("rollback");
    let lines = lines.lock();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with("): rolled back"));
}

#[test]
fn test_failed_validation_issues_no_statement() {
    let (logger, lines) = recorder();
    let client = prepared_client(vec![ClientOption::Log(logger)]).debug();
    let ctx = Context::background();

    let missing = client.user().create().set_tenant("acme").save(&ctx);
    assert!(missing.expect_err("missing email").is_validation());

    let empty = client
        .user()
        .create()
        .set_email("")
        .set_tenant("acme")
        .save(&ctx);
    assert!(empty.expect_err("empty email").is_validation());

    let unknown = client
        .user()
        .create()
        .set("nickname", "ada")
        .set_email("ada@example.com")
        .set_tenant("acme")
        .save(&ctx);
    assert!(unknown.expect_err("unknown field").is_validation());

    let wrong_kind = client
        .user()
        .create()
        .set("email", 42_i64)
        .set_tenant("acme")
        .save(&ctx);
    assert!(wrong_kind.expect_err("wrong kind").is_validation());

    let bad_role = client
        .user()
        .create()
        .set_email("ada@example.com")
        .set_tenant("acme")
        .set("role", "root")
        .save(&ctx);
    assert!(bad_role.expect_err("bad enum").is_validation());

    let immutable = client
        .user()
        .update()
        .set("created_at", chrono::Utc::now())
        .save(&ctx);
    assert!(immutable.expect_err("immutable").is_validation());

    let cleared = client.user().update_one_id(1).clear("email").save(&ctx);
    assert!(cleared.expect_err("required").is_validation());

    let status_code = client
        .audit_log()
        .create()
        .set_acting_user_id(1)
        .set_organization("acme")
        .set_mutation_type("create")
        .set_object("1", "user", "Ada")
        .set_request("/", "127.0.0.1")
        .set_status(false, -1)
        .save(&ctx);
    assert!(status_code.expect_err("negative code").is_validation());

    assert!(lines.lock().is_empty(), "{:?}", lines.lock());
}
