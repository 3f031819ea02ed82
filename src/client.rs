//! Client entry points: [`open`], [`Client`], [`Tx`] and the per-entity
//! [`EntityClient`].

use std::{fmt, marker::PhantomData, sync::Arc};

use crate::{
    builder::{Create, CreateBulk, Delete, DeleteOne, Query, Update, UpdateOne},
    context::Context,
    dialect::Dialect,
    driver::{DebugDriver, Driver, Logger, SqliteDriver, TxDriver, default_logger},
    entity::{self, AuditLog, Entity, Tenant, Token, User},
    errors::EntError,
    migrate::Schema,
    neighbors::{Step, neighbors},
    schema::EdgeRegistry,
    sql::Predicate,
};

/// Driver, logger, debug flag and edge registry shared by every builder.
#[derive(Clone)]
pub struct Config {
    driver: Arc<dyn Driver>,
    log: Logger,
    debug: bool,
    registry: Arc<EdgeRegistry>,
}

impl Config {
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub fn registry(&self) -> &EdgeRegistry {
        &self.registry
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub(crate) fn with_driver(&self, driver: Arc<dyn Driver>) -> Config {
        Config {
            driver,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("dialect", &self.dialect())
            .field("debug", &self.debug)
            .field("in_transaction", &self.driver.in_transaction())
            .finish()
    }
}

/// Options accepted by [`open`], [`Client::new`] and [`Client::with_registry`].
#[derive(Clone)]
pub enum ClientOption {
    /// Use this driver instead of the one the constructor would build.
    Driver(Arc<dyn Driver>),
    /// Sink for debug lines; defaults to [`default_logger`].
    Log(Logger),
    /// Log every statement through the configured logger.
    Debug,
}

/// Opens a client for `dialect`.
///
/// `sqlite3` opens `dsn` with the bundled SQLite driver. `mysql` and
/// `postgres` have no bundled driver and need [`ClientOption::Driver`].
pub fn open(dialect: &str, dsn: &str, options: Vec<ClientOption>) -> Result<Client, EntError> {
    let dialect = Dialect::from_name(dialect)?;
    let supplied = options.iter().rev().find_map(|option| match option {
        ClientOption::Driver(driver) => Some(Arc::clone(driver)),
        _ => None,
    });
    let driver = match supplied {
        Some(driver) => {
            if driver.dialect() != dialect {
                return Err(EntError::driver(format!(
                    "supplied driver speaks {}, not {dialect}",
                    driver.dialect()
                )));
            }
            driver
        }
        None if dialect == Dialect::Sqlite => Arc::new(SqliteDriver::open(dsn)?) as Arc<dyn Driver>,
        None => {
            return Err(EntError::driver(format!(
                "no bundled driver for {dialect}; pass ClientOption::Driver"
            )));
        }
    };
    tracing::debug!(dialect = %dialect, "opened client");
    Client::new(driver, options)
}

/// Entry point to every entity client.
#[derive(Clone, Debug)]
pub struct Client {
    config: Config,
}

impl Client {
    /// Client over `driver` with the shipped entity registry.
    pub fn new(driver: Arc<dyn Driver>, options: Vec<ClientOption>) -> Result<Self, EntError> {
        Self::with_registry(driver, Arc::new(entity::registry()?), options)
    }

    /// Client over `driver` resolving edges through `registry`.
    pub fn with_registry(
        driver: Arc<dyn Driver>,
        registry: Arc<EdgeRegistry>,
        options: Vec<ClientOption>,
    ) -> Result<Self, EntError> {
        let mut config = Config {
            driver,
            log: default_logger(),
            debug: false,
            registry,
        };
        for option in options {
            match option {
                ClientOption::Driver(driver) => config.driver = driver,
                ClientOption::Log(log) => config.log = log,
                ClientOption::Debug => config.debug = true,
            }
        }
        if config.debug {
            config.driver = Arc::new(DebugDriver::new(config.driver, Arc::clone(&config.log)));
        }
        Ok(Client { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A client logging every statement. Already-debug clients come back unchanged.
    pub fn debug(&self) -> Client {
        if self.config.debug {
            return self.clone();
        }
        let driver = Arc::new(DebugDriver::new(
            Arc::clone(&self.config.driver),
            Arc::clone(&self.config.log),
        ));
        let mut config = self.config.with_driver(driver);
        config.debug = true;
        Client { config }
    }

    /// Starts a transaction; `NestedTransaction` if this client already runs in one.
    pub fn tx(&self, ctx: &Context) -> Result<Tx, EntError> {
        if self.config.driver.in_transaction() {
            return Err(EntError::NestedTransaction);
        }
        let tx = self.config.driver.tx(ctx)?;
        let driver = Arc::new(TxDriver::new(tx, self.config.dialect()));
        let client = Client {
            config: self
                .config
                .with_driver(Arc::clone(&driver) as Arc<dyn Driver>),
        };
        Ok(Tx { client, driver })
    }

    pub fn close(&self) -> Result<(), EntError> {
        self.config.driver.close()
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.config.clone())
    }

    pub fn entity<E: Entity>(&self) -> EntityClient<E> {
        EntityClient::new(self.config.clone())
    }

    pub fn audit_log(&self) -> EntityClient<AuditLog> {
        self.entity()
    }

    pub fn tenant(&self) -> EntityClient<Tenant> {
        self.entity()
    }

    pub fn token(&self) -> EntityClient<Token> {
        self.entity()
    }

    pub fn user(&self) -> EntityClient<User> {
        self.entity()
    }
}

/// A client scoped to one transaction.
///
/// Dropping a `Tx` that was neither committed nor rolled back rolls it back
/// once every client obtained from it is gone.
pub struct Tx {
    client: Client,
    driver: Arc<TxDriver>,
}

impl Tx {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn commit(&self) -> Result<(), EntError> {
        self.driver.commit()
    }

    pub fn rollback(&self) -> Result<(), EntError> {
        self.driver.rollback()
    }

    pub fn audit_log(&self) -> EntityClient<AuditLog> {
        self.client.audit_log()
    }

    pub fn tenant(&self) -> EntityClient<Tenant> {
        self.client.tenant()
    }

    pub fn token(&self) -> EntityClient<Token> {
        self.client.token()
    }

    pub fn user(&self) -> EntityClient<User> {
        self.client.user()
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("state", &self.driver.state())
            .finish()
    }
}

/// Builders for one entity type. Holds nothing but the [`Config`].
#[derive(Debug)]
pub struct EntityClient<E: Entity> {
    config: Config,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for EntityClient<E> {
    fn clone(&self) -> Self {
        Self::new(self.config.clone())
    }
}

impl<E: Entity> EntityClient<E> {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            _entity: PhantomData,
        }
    }

    pub fn create(&self) -> Create<E> {
        Create::new(self.config.clone())
    }

    pub fn create_bulk(&self, builders: Vec<Create<E>>) -> CreateBulk<E> {
        CreateBulk::new(self.config.clone(), builders)
    }

    pub fn update(&self) -> Update<E> {
        Update::new(self.config.clone())
    }

    pub fn update_one(&self, entity: &E) -> UpdateOne<E> {
        self.update_one_id(entity.id())
    }

    pub fn update_one_id(&self, id: i64) -> UpdateOne<E> {
        UpdateOne::new(self.config.clone(), id)
    }

    pub fn delete(&self) -> Delete<E> {
        Delete::new(self.config.clone())
    }

    pub fn delete_one(&self, entity: &E) -> DeleteOne<E> {
        self.delete_one_id(entity.id())
    }

    pub fn delete_one_id(&self, id: i64) -> DeleteOne<E> {
        DeleteOne::new(self.config.clone(), id)
    }

    pub fn query(&self) -> Query<E> {
        Query::new(self.config.clone())
    }

    pub fn get(&self, ctx: &Context, id: i64) -> Result<E, EntError> {
        self.query()
            .filter(Predicate::eq(E::schema().id_column, id))
            .only(ctx)
    }

    /// Neighbors of `source` over `edge`, as a query over the edge's target type.
    ///
    /// Fails with `UnknownEdge` when `E` declares no such edge and with
    /// `InvalidInput` when `T` is not the edge's target.
    pub fn query_edge<T: Entity>(&self, source: &E, edge: &str) -> Result<Query<T>, EntError> {
        let (step, descriptor) = Step::resolve(self.config.registry(), source, edge)?;
        if descriptor.target != T::schema().name {
            return Err(EntError::invalid_input(format!(
                "edge {}.{} targets {}, not {}",
                descriptor.source,
                descriptor.name,
                descriptor.target,
                T::schema().name
            )));
        }
        Ok(Query::from_selector(self.config.clone(), neighbors(&step)?))
    }
}
