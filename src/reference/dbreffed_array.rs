use crate::core::{DocError, Result};
use crate::document::Document;
use crate::model::Model;
use crate::schema::PathKind;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::{Level, event};

use super::{DbRefPointer, Eventual, FetchPhase, Resolver, Sequence};

/// Pagination window of an inverse reference collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

/// Inverse (has-many) side of a reference: the members are the documents of
/// another collection whose back-reference field points at the owner.
#[derive(Clone)]
pub struct DbReffedArray {
    model: Model,
    owner: DbRefPointer,
    referred_as: String,
    page: Arc<Mutex<Page>>,
    default_limit: Option<usize>,
    members: Eventual<Document>,
}

impl std::fmt::Debug for DbReffedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbReffedArray")
            .field("model", &self.model.name())
            .field("owner", &self.owner)
            .field("referred_as", &self.referred_as)
            .field("members", &self.members)
            .finish()
    }
}

impl DbReffedArray {
    pub(crate) fn new(
        model: Model,
        owner: DbRefPointer,
        referred_as: impl Into<String>,
        default_limit: Option<usize>,
    ) -> Self {
        Self {
            model,
            owner,
            referred_as: referred_as.into(),
            page: Arc::new(Mutex::new(Page::default())),
            default_limit,
            members: Eventual::default(),
        }
    }

    pub fn referred_as(&self) -> &str {
        &self.referred_as
    }

    pub fn phase(&self) -> Result<FetchPhase> {
        self.members.phase()
    }

    pub fn loaded(&self) -> Result<Vec<Document>> {
        self.members.snapshot()
    }

    pub fn current_page(&self) -> Result<Page> {
        Ok(*self.page.lock()?)
    }

    /// Changes the window; the next access queries the store again.
    pub fn page(&self, limit: Option<usize>, skip: Option<usize>) -> Result<&Self> {
        *self.page.lock()? = Page { limit, skip };
        self.members.reset()?;
        Ok(self)
    }

    /// Builds a new member pointing back at the owner, without persisting it.
    pub fn build(&self, attrs: Value) -> Result<Document> {
        let member = Document::assemble(self.model.clone(), self.with_back_reference(attrs)?, true);
        self.members.update(|items| items.push(member.clone()))?;
        Ok(member)
    }

    /// Like [`DbReffedArray::build`], but persists the member first and only
    /// then appends it.
    pub async fn create(&self, attrs: Value) -> Result<Document> {
        let member = self.model.create(self.with_back_reference(attrs)?).await?;
        self.members.update(|items| items.push(member.clone()))?;
        Ok(member)
    }

    pub(crate) fn adopt(&self, members: Vec<Document>) -> Result<()> {
        self.members.update(|items| *items = members)
    }

    fn with_back_reference(&self, attrs: Value) -> Result<Value> {
        let mut attrs = match attrs {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(DocError::coercion(
                    &self.referred_as,
                    &other,
                    PathKind::Object.as_str(),
                ));
            }
        };
        attrs.insert(self.referred_as.clone(), self.owner.to_value());
        Ok(Value::Object(attrs))
    }
}

#[async_trait]
impl Resolver<Document> for DbReffedArray {
    fn needs_fetch(&self, phase: FetchPhase, _items: &[Document]) -> bool {
        phase != FetchPhase::Fetched
    }

    /// Queries the foreign collection by back-reference. Members built but
    /// not yet saved stay in front of the fetched page.
    async fn fetch(&self, known: Vec<Document>) -> Result<Vec<Document>> {
        let page = self.current_page()?;
        let mut selector = Map::new();
        selector.insert(
            format!("{}.$ref", self.referred_as),
            Value::String(self.owner.collection.clone()),
        );
        selector.insert(
            format!("{}.$id", self.referred_as),
            Value::String(self.owner.id.clone()),
        );

        let mut query = self.model.find(Value::Object(selector));
        if let Some(limit) = page.limit.or(self.default_limit) {
            query = query.limit(limit);
        }
        if let Some(skip) = page.skip {
            query = query.skip(skip);
        }
        let fetched = query.all().await?;
        event!(
            Level::DEBUG,
            collection = %self.model.collection(),
            fetched = fetched.len(),
            "inverse references fetched"
        );

        let mut members: Vec<Document> = known.into_iter().filter(Document::is_new).collect();
        members.extend(fetched);
        Ok(members)
    }
}

#[async_trait]
impl Sequence<Document> for DbReffedArray {
    async fn all(&self) -> Result<Vec<Document>> {
        self.members.resolve(self).await
    }
}

impl Document {
    /// Handle on the inverse reference collection declared at `path`.
    pub fn dbreffed_array(&mut self, ref_path: &str) -> Result<DbReffedArray> {
        if let Some(handle) = self.dbreffed_arrays.get(ref_path) {
            return Ok(handle.clone());
        }
        let handle = self.new_dbreffed_array(ref_path)?;
        self.dbreffed_arrays
            .insert(ref_path.to_string(), handle.clone());
        Ok(handle)
    }

    pub(crate) fn new_dbreffed_array(&self, ref_path: &str) -> Result<DbReffedArray> {
        self.expect_kind(ref_path, PathKind::DbReffedArray)?;
        let descriptor = self.descriptor(ref_path)?;
        let referred_as = descriptor.referred_as.clone().ok_or_else(|| {
            DocError::ReferenceIntegrity(format!("{} has no back-reference field", ref_path))
        })?;
        let model = self.related_model(ref_path)?;
        let default_limit = self.model.connection().config().default_page_size;
        Ok(DbReffedArray::new(
            model,
            self.pointer()?,
            referred_as,
            default_limit,
        ))
    }
}
