//! The session context.
//!
//! An [`Odm`] owns the configuration, the database connection and the
//! registry of models by name. Relations look their target model up in the
//! registry when they are resolved, so two models can refer to each other
//! regardless of which one is defined first.

use crate::config::Config;
use crate::database::{Database, Reference};
use crate::model::Model;
use crate::schema::Schema;
use crate::{naming, path, Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Configuration, connection and model registry shared by every model.
#[derive(Clone, Default)]
pub struct Odm {
    shared: Arc<OdmShared>,
}

#[derive(Default)]
pub(crate) struct OdmShared {
    config: Config,
    database: RwLock<Option<Arc<dyn Database>>>,
    models: DashMap<String, Model>,
}

impl Odm {
    pub fn new(config: Config) -> Self {
        Self {
            shared: Arc::new(OdmShared {
                config,
                database: RwLock::new(None),
                models: DashMap::new(),
            }),
        }
    }

    /// Use `db` for every remote operation from now on.
    pub fn connect<D: Database + 'static>(&self, db: D) {
        self.connect_shared(Arc::new(db));
    }

    pub fn connect_shared(&self, db: Arc<dyn Database>) {
        *self.shared.database.write() = Some(db);
        tracing::info!("database connected");
    }

    pub fn disconnect(&self) {
        if self.shared.database.write().take().is_some() {
            tracing::info!("database disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.database.read().is_some()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The connected database.
    pub fn database(&self) -> Result<Arc<dyn Database>> {
        self.shared.database().ok_or(Error::NotConnected)
    }

    /// A reference to `path`, below the configured root.
    pub fn reference(&self, path: &str) -> Result<Reference> {
        Ok(Reference::new(self.database()?, self.rooted(path)))
    }

    /// Define a model stored under the plural of its name.
    pub fn define(&self, name: &str, schema: Schema) -> Result<Model> {
        self.define_in(name, &naming::pluralize(name), schema)
    }

    /// Define a model stored under `collection`.
    ///
    /// A model defined under an existing name replaces it in the registry.
    pub fn define_in(&self, name: &str, collection: &str, schema: Schema) -> Result<Model> {
        if name.is_empty() {
            return Err(Error::Schema("model name must not be empty".into()));
        }
        if path::slashed(collection).is_empty() {
            return Err(Error::Schema(format!(
                "collection key {collection:?} of {name} must not be empty"
            )));
        }

        let model = Model::new(
            Arc::downgrade(&self.shared),
            name.to_string(),
            self.rooted(collection),
            schema,
        );
        if self
            .shared
            .models
            .insert(name.to_string(), model.clone())
            .is_some()
        {
            tracing::warn!(model = %name, "model redefined");
        }
        tracing::info!(model = %name, collection = %model.collection_path(), "model defined");
        Ok(model)
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Option<Model> {
        self.shared.model(name)
    }

    /// Registered model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .models
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    fn rooted(&self, path: &str) -> String {
        match &self.shared.config.root {
            Some(root) => path::child(root, path),
            None => path::join(&path::slashed(path)),
        }
    }

    pub(crate) fn from_shared(shared: Arc<OdmShared>) -> Self {
        Self { shared }
    }
}

impl OdmShared {
    pub(crate) fn database(&self) -> Option<Arc<dyn Database>> {
        self.database.read().clone()
    }

    pub(crate) fn model(&self, name: &str) -> Option<Model> {
        self.models.get(name).map(|entry| entry.value().clone())
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for Odm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Odm")
            .field("config", &self.shared.config)
            .field("connected", &self.is_connected())
            .field("models", &self.models())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use crate::MemoryDatabase;

    fn schema() -> Schema {
        Schema::builder()
            .field("name", schema::string())
            .build()
            .unwrap()
    }

    #[test]
    fn connection_lifecycle() {
        let odm = Odm::default();
        assert!(!odm.is_connected());
        assert!(matches!(odm.database(), Err(Error::NotConnected)));
        assert!(matches!(odm.reference("players"), Err(Error::NotConnected)));

        odm.connect(MemoryDatabase::new());
        assert!(odm.is_connected());
        assert_eq!(odm.reference("/players/").unwrap().path(), "players");

        odm.disconnect();
        assert!(!odm.is_connected());
    }

    #[test]
    fn not_connected_message_has_hint() {
        assert!(Error::NotConnected.to_string().contains("Odm::connect"));
    }

    #[test]
    fn define_registers_models() {
        let odm = Odm::default();
        let player = odm.define("Player", schema()).unwrap();
        let person = odm.define_in("Person", "humans", schema()).unwrap();

        assert_eq!(player.collection_path(), "Players");
        assert_eq!(person.collection_path(), "humans");
        assert_eq!(odm.models(), vec!["Person", "Player"]);
        assert_eq!(odm.model("Player").unwrap().name(), "Player");
        assert!(odm.model("Animal").is_none());
    }

    #[test]
    fn root_prefixes_collections() {
        let odm = Odm::new(Config::new().with_root("game"));
        odm.connect(MemoryDatabase::new());
        let player = odm.define("Player", schema()).unwrap();
        assert_eq!(player.collection_path(), "game/Players");
        assert_eq!(odm.reference("Players").unwrap().path(), "game/Players");
    }

    #[test]
    fn invalid_definitions() {
        let odm = Odm::default();
        assert!(odm.define("", schema()).is_err());
        assert!(odm.define_in("Player", "/", schema()).is_err());
    }
}
