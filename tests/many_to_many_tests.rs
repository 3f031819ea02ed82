use std::sync::Arc;

use entgraph::{
    Client, Context, EdgeDescriptor, EdgeRegistry, EntError, Entity, EntitySchema, FieldKind,
    FieldSchema, Predicate, Rel, Row, SqliteDriver,
};

static GROUP: EntitySchema = EntitySchema {
    name: "Group",
    table: "groups",
    id_column: "id",
    fields: &[FieldSchema::new("name", FieldKind::String).unique()],
    foreign_keys: &[],
    edges: &[EdgeDescriptor {
        name: "members",
        source: "Group",
        target: "Member",
        rel: Rel::ManyToMany,
        inverse: "groups",
        table: "group_members",
        columns: &["group_id", "member_id"],
        required: false,
    }],
};

static MEMBER: EntitySchema = EntitySchema {
    name: "Member",
    table: "members",
    id_column: "id",
    fields: &[FieldSchema::new("name", FieldKind::String)],
    foreign_keys: &[],
    edges: &[EdgeDescriptor {
        name: "groups",
        source: "Member",
        target: "Group",
        rel: Rel::ManyToMany,
        inverse: "members",
        table: "group_members",
        columns: &["member_id", "group_id"],
        required: false,
    }],
};

#[derive(Clone, Debug, PartialEq)]
struct Group {
    id: i64,
    name: String,
}

impl Entity for Group {
    fn schema() -> &'static EntitySchema {
        &GROUP
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self, EntError> {
        Ok(Group {
            id: row.int("id")?,
            name: row.string("name")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Member {
    id: i64,
    name: String,
}

impl Entity for Member {
    fn schema() -> &'static EntitySchema {
        &MEMBER
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self, EntError> {
        Ok(Member {
            id: row.int("id")?,
            name: row.string("name")?,
        })
    }
}

fn prepared_client() -> Client {
    let registry = EdgeRegistry::new(&[&GROUP, &MEMBER]).expect("registry");
    let driver = SqliteDriver::open_in_memory().expect("driver");
    let client =
        Client::with_registry(Arc::new(driver), Arc::new(registry), Vec::new()).expect("client");
    client
        .schema()
        .create(&Context::background())
        .expect("schema");
    client
}

fn member(client: &Client, name: &str) -> Member {
    client
        .entity::<Member>()
        .create()
        .set("name", name)
        .save(&Context::background())
        .expect("member")
}

#[test]
fn test_join_table_is_created_once() {
    let client = prepared_client();
    let report = client.schema().plan().expect("plan");
    let joins = report
        .statements
        .iter()
        .filter(|sql| sql.contains("\"group_members\""))
        .count();
    assert_eq!(joins, 1);
}

#[test]
fn test_members_resolve_in_both_directions() {
    let client = prepared_client();
    let ctx = Context::background();
    let ann = member(&client, "ann");
    let bob = member(&client, "bob");
    member(&client, "cat");
    let core = client
        .entity::<Group>()
        .create()
        .set("name", "core")
        .add_edge_ids("members", [ann.id, bob.id])
        .save(&ctx)
        .expect("group");

    let members = client
        .entity::<Group>()
        .query_edge::<Member>(&core, "members")
        .expect("step")
        .all(&ctx)
        .expect("members");
    assert_eq!(members, vec![ann.clone(), bob]);

    let groups = client
        .entity::<Member>()
        .query_edge::<Group>(&ann, "groups")
        .expect("step")
        .all(&ctx)
        .expect("groups");
    assert_eq!(groups, vec![core]);
}

#[test]
fn test_remove_and_clear_members() {
    let client = prepared_client();
    let ctx = Context::background();
    let ann = member(&client, "ann");
    let bob = member(&client, "bob");
    let core = client
        .entity::<Group>()
        .create()
        .set("name", "core")
        .add_edge_ids("members", [ann.id, bob.id])
        .save(&ctx)
        .expect("group");

    client
        .entity::<Group>()
        .update_one(&core)
        .remove_edge_ids("members", [ann.id])
        .save(&ctx)
        .expect("remove");
    let remaining = client
        .entity::<Group>()
        .query_edge::<Member>(&core, "members")
        .expect("step")
        .ids(&ctx)
        .expect("ids");
    assert_eq!(remaining, vec![bob.id]);

    client
        .entity::<Group>()
        .update_one(&core)
        .clear_edge("members")
        .save(&ctx)
        .expect("clear");
    assert_eq!(
        client
            .entity::<Group>()
            .query_edge::<Member>(&core, "members")
            .expect("step")
            .count(&ctx)
            .expect("count"),
        0
    );
}

#[test]
fn test_deleting_member_removes_join_rows() {
    let client = prepared_client();
    let ctx = Context::background();
    let ann = member(&client, "ann");
    let core = client
        .entity::<Group>()
        .create()
        .set("name", "core")
        .add_edge_ids("members", [ann.id])
        .save(&ctx)
        .expect("group");
    client
        .entity::<Member>()
        .delete_one(&ann)
        .exec(&ctx)
        .expect("delete");
    assert!(
        client
            .entity::<Group>()
            .query_edge::<Member>(&core, "members")
            .expect("step")
            .all(&ctx)
            .expect("members")
            .is_empty()
    );
}

#[test]
fn test_has_members_with_predicate() {
    let client = prepared_client();
    let ctx = Context::background();
    let ann = member(&client, "ann");
    let bob = member(&client, "bob");
    for (name, id) in [("core", ann.id), ("docs", bob.id)] {
        client
            .entity::<Group>()
            .create()
            .set("name", name)
            .add_edge_ids("members", [id])
            .save(&ctx)
            .expect("group");
    }
    client
        .entity::<Group>()
        .create()
        .set("name", "empty")
        .save(&ctx)
        .expect("group");

    let with_ann = client
        .entity::<Group>()
        .query()
        .filter(Predicate::has_edge_with(
            "members",
            vec![Predicate::eq("name", "ann")],
        ))
        .only(&ctx)
        .expect("group");
    assert_eq!(with_ann.name, "core");

    let populated = client
        .entity::<Group>()
        .query()
        .filter(Predicate::has_edge("members"))
        .count(&ctx)
        .expect("count");
    assert_eq!(populated, 2);
}

#[test]
fn test_single_id_setter_rejected_for_many_to_many() {
    let client = prepared_client();
    let ann = member(&client, "ann");
    let err = client
        .entity::<Group>()
        .create()
        .set("name", "core")
        .set_edge_id("members", ann.id)
        .save(&Context::background())
        .expect_err("many-to-many");
    assert!(err.is_validation());
}

#[test]
fn test_registry_rejects_mismatched_inverse() {
    static LONELY: EntitySchema = EntitySchema {
        name: "Lonely",
        table: "lonely",
        id_column: "id",
        fields: &[],
        foreign_keys: &[],
        edges: &[EdgeDescriptor {
            name: "friends",
            source: "Lonely",
            target: "Member",
            rel: Rel::ManyToMany,
            inverse: "groups",
            table: "group_members",
            columns: &["lonely_id", "member_id"],
            required: false,
        }],
    };
    let err = EdgeRegistry::new(&[&GROUP, &MEMBER, &LONELY]).expect_err("bad inverse");
    assert!(matches!(err, EntError::SchemaError(_)));
}
