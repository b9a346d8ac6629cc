//! Generic collection store shared by tasks, goals, projects, routines and
//! alarms.
//!
//! An [`EntityStore`] owns one collection, the filter configuration, the
//! derived view computed from both, a selection and an error slot. Remote
//! calls go through the [`Gateway`]; only `reorder` mutates local state
//! before the backend confirms.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::entity_path;
use crate::api::{ApiRequest, Gateway, Pagination};
use crate::error::{Error, Result, StoreError};
use crate::storage::KeyValueCache;
use crate::types::{Priority, Validate};

use super::lock;
use super::mutation::{self, RollbackPolicy, Snapshot};

/// A backend resource managed by an [`EntityStore`]
pub trait Entity:
    Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: Debug
        + Copy
        + Eq
        + Ord
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;
    type Draft: Serialize + Validate + Send + Sync;
    type Patch: Serialize + Validate + Send + Sync;

    /// Path segment on the backend, e.g. `tasks`
    const RESOURCE: &'static str;
    /// Singular noun used in notices, e.g. `task`
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn title(&self) -> &str;
    fn status(&self) -> Self::Status;

    fn description(&self) -> Option<&str> {
        None
    }
    fn priority(&self) -> Option<Priority> {
        None
    }
    fn due_date(&self) -> Option<NaiveDate> {
        None
    }
    fn order(&self) -> i64 {
        0
    }
    fn set_order(&mut self, _order: i64) {}
    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

// ============================================
// Filters and the derived view
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Manual order set by `reorder`
    #[default]
    Order,
    Title,
    Priority,
    DueDate,
    CreatedAt,
    UpdatedAt,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Search, filter and sort configuration for one collection.
///
/// Empty status or priority sets mean "no filter".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState<S: Ord> {
    pub search_query: String,
    pub statuses: BTreeSet<S>,
    pub priorities: BTreeSet<Priority>,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
}

impl<S: Ord> Default for FilterState<S> {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            statuses: BTreeSet::new(),
            priorities: BTreeSet::new(),
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl<S: Ord> FilterState<S> {
    pub fn is_filtering(&self) -> bool {
        !self.search_query.trim().is_empty()
            || !self.statuses.is_empty()
            || !self.priorities.is_empty()
    }
}

/// Project `items` through `filters`.
///
/// Text search matches title or description case-insensitively. The sort is
/// stable in both directions: items comparing equal keep their relative
/// order from `items`.
pub fn derive_view<E: Entity>(items: &[E], filters: &FilterState<E::Status>) -> Vec<E> {
    let query = filters.search_query.trim().to_lowercase();

    let mut view: Vec<E> = items
        .iter()
        .filter(|item| query.is_empty() || matches_query(*item, &query))
        .filter(|item| filters.statuses.is_empty() || filters.statuses.contains(&item.status()))
        .filter(|item| {
            filters.priorities.is_empty()
                || item
                    .priority()
                    .is_some_and(|p| filters.priorities.contains(&p))
        })
        .cloned()
        .collect();

    view.sort_by(|a, b| {
        let ordering = compare_by(a, b, filters.sort_by);
        match filters.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    view
}

fn matches_query<E: Entity>(item: &E, query: &str) -> bool {
    item.title().to_lowercase().contains(query)
        || item
            .description()
            .is_some_and(|d| d.to_lowercase().contains(query))
}

fn compare_by<E: Entity>(a: &E, b: &E, key: SortKey) -> Ordering {
    match key {
        SortKey::Order => a.order().cmp(&b.order()),
        SortKey::Title => a.title().to_lowercase().cmp(&b.title().to_lowercase()),
        SortKey::Priority => a.priority().cmp(&b.priority()),
        // Undated items go last
        SortKey::DueDate => match (a.due_date(), b.due_date()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::CreatedAt => a.created_at().cmp(&b.created_at()),
        SortKey::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
        SortKey::Status => a.status().cmp(&b.status()),
    }
}

// ============================================
// Store state
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageInfo {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

impl PageInfo {
    pub fn has_more(&self) -> bool {
        self.current_page < self.total_pages
    }
}

#[derive(Debug, Clone)]
pub struct EntityState<E: Entity> {
    pub items: Vec<E>,
    pub view: Vec<E>,
    pub filters: FilterState<E::Status>,
    pub selected_id: Option<String>,
    pub is_loading: bool,
    pub error: Option<StoreError>,
    pub page: PageInfo,
}

impl<E: Entity> EntityState<E> {
    fn new(filters: FilterState<E::Status>) -> Self {
        Self {
            items: Vec::new(),
            view: Vec::new(),
            filters,
            selected_id: None,
            is_loading: false,
            error: None,
            page: PageInfo::default(),
        }
    }

    fn refresh_view(&mut self) {
        self.view = derive_view(&self.items, &self.filters);
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|e| e.id() == id)
    }
}

impl<E: Entity> Snapshot for EntityState<E> {
    type Saved = Vec<E>;

    fn save(&self) -> Vec<E> {
        self.items.clone()
    }

    fn restore(&mut self, saved: Vec<E>) {
        self.items = saved;
        self.refresh_view();
    }
}

#[derive(Serialize)]
struct Position<'a> {
    id: &'a str,
    order: i64,
}

// ============================================
// EntityStore
// ============================================

pub struct EntityStore<E: Entity> {
    gateway: Arc<Gateway>,
    cache: Option<Arc<dyn KeyValueCache>>,
    state: Mutex<EntityState<E>>,
}

impl<E: Entity> EntityStore<E> {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            cache: None,
            state: Mutex::new(EntityState::new(FilterState::default())),
        }
    }

    /// Store whose filter state is persisted under `filters.<resource>`,
    /// starting from whatever was saved last.
    pub fn with_cache(gateway: Arc<Gateway>, cache: Arc<dyn KeyValueCache>) -> Self {
        let filters = match cache.load::<FilterState<E::Status>>(&Self::filters_key()) {
            Ok(Some(filters)) => filters,
            Ok(None) => FilterState::default(),
            Err(e) => {
                tracing::warn!(resource = E::RESOURCE, error = %e, "Ignoring unreadable saved filters");
                FilterState::default()
            }
        };
        let mut state = EntityState::new(filters);
        state.refresh_view();

        Self {
            gateway,
            cache: Some(cache),
            state: Mutex::new(state),
        }
    }

    fn filters_key() -> String {
        format!("filters.{}", E::RESOURCE)
    }

    fn lock(&self) -> MutexGuard<'_, EntityState<E>> {
        lock(&self.state)
    }

    pub(crate) fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    // ------------------------------------------
    // Reads
    // ------------------------------------------

    pub fn snapshot(&self) -> EntityState<E> {
        self.lock().clone()
    }

    pub fn items(&self) -> Vec<E> {
        self.lock().items.clone()
    }

    /// The filtered and sorted projection of the collection
    pub fn view(&self) -> Vec<E> {
        self.lock().view.clone()
    }

    pub fn get(&self, id: &str) -> Option<E> {
        let state = self.lock();
        state.position(id).map(|i| state.items[i].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    pub fn error(&self) -> Option<StoreError> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn page_info(&self) -> PageInfo {
        self.lock().page
    }

    pub fn filters(&self) -> FilterState<E::Status> {
        self.lock().filters.clone()
    }

    // ------------------------------------------
    // Selection
    // ------------------------------------------

    pub fn select(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.position(id).is_none() {
            return Err(Error::not_found(E::KIND, id));
        }
        state.selected_id = Some(id.to_string());
        Ok(())
    }

    pub fn clear_selection(&self) {
        self.lock().selected_id = None;
    }

    pub fn selected(&self) -> Option<E> {
        let state = self.lock();
        let id = state.selected_id.as_deref()?;
        state.position(id).map(|i| state.items[i].clone())
    }

    // ------------------------------------------
    // Filters
    // ------------------------------------------

    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.update_filters(|f| f.search_query = query);
    }

    pub fn set_status_filter(&self, statuses: impl IntoIterator<Item = E::Status>) {
        let statuses: BTreeSet<_> = statuses.into_iter().collect();
        self.update_filters(|f| f.statuses = statuses);
    }

    pub fn set_priority_filter(&self, priorities: impl IntoIterator<Item = Priority>) {
        let priorities: BTreeSet<_> = priorities.into_iter().collect();
        self.update_filters(|f| f.priorities = priorities);
    }

    pub fn set_sort(&self, sort_by: SortKey, sort_order: SortOrder) {
        self.update_filters(|f| {
            f.sort_by = sort_by;
            f.sort_order = sort_order;
        });
    }

    pub fn reset_filters(&self) {
        self.update_filters(|f| *f = FilterState::default());
    }

    fn update_filters(&self, change: impl FnOnce(&mut FilterState<E::Status>)) {
        let filters = {
            let mut state = self.lock();
            change(&mut state.filters);
            state.refresh_view();
            state.filters.clone()
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(&Self::filters_key(), &filters) {
                tracing::warn!(resource = E::RESOURCE, error = %e, "Failed to persist filters");
            }
        }
    }

    // ------------------------------------------
    // Remote operations
    // ------------------------------------------

    /// Load one page. Page 1 replaces the collection; later pages append.
    pub async fn fetch_all(&self, page: u32, limit: u32) -> Result<Vec<E>> {
        let request = ApiRequest::get(format!("/{}", E::RESOURCE))
            .query("page", page)
            .query("limit", limit);
        self.fetch_page(request, page).await
    }

    pub(crate) async fn fetch_page(&self, request: ApiRequest, page: u32) -> Result<Vec<E>> {
        self.lock().is_loading = true;

        let result = match self.gateway.send::<Vec<E>>(&request).await {
            Ok(mut envelope) => {
                let pagination = envelope.pagination.take();
                envelope.into_data().map(|items| (items, pagination))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((items, pagination)) => {
                let mut state = self.lock();
                if page <= 1 {
                    state.items = items.clone();
                } else {
                    for item in &items {
                        match state.position(item.id()) {
                            Some(i) => state.items[i] = item.clone(),
                            None => state.items.push(item.clone()),
                        }
                    }
                }
                let loaded = state.items.len();
                state.page = page_info(pagination, page, loaded);
                state.is_loading = false;
                state.error = None;
                state.refresh_view();

                tracing::debug!(resource = E::RESOURCE, page, count = items.len(), "Fetched page");
                Ok(items)
            }
            Err(e) => Err(self.record(format!("Failed to load {}", E::RESOURCE), e)),
        }
    }

    /// Load a single entity, merge it into the collection and select it
    pub async fn fetch_one(&self, id: &str) -> Result<E> {
        let request = ApiRequest::get(entity_path(E::RESOURCE, id, None));
        match self.gateway.fetch::<E>(&request).await {
            Ok(entity) => {
                let mut state = self.lock();
                match state.position(entity.id()) {
                    Some(i) => state.items[i] = entity.clone(),
                    None => state.items.push(entity.clone()),
                }
                state.selected_id = Some(entity.id().to_string());
                state.error = None;
                state.refresh_view();
                Ok(entity)
            }
            Err(e) => Err(self.record(format!("Failed to load {} {}", E::KIND, id), e)),
        }
    }

    /// Create remotely, then prepend the server's copy
    pub async fn create(&self, draft: &E::Draft) -> Result<E> {
        let notice = format!("Failed to create {}", E::KIND);
        if let Err(e) = draft.validate() {
            return Err(self.record(notice, e));
        }

        let request = match ApiRequest::post(format!("/{}", E::RESOURCE)).json(draft) {
            Ok(request) => request,
            Err(e) => return Err(self.record(notice, e)),
        };

        match self.gateway.fetch::<E>(&request).await {
            Ok(entity) => {
                tracing::info!(resource = E::RESOURCE, id = entity.id(), "Created");
                let mut state = self.lock();
                state.items.insert(0, entity.clone());
                state.error = None;
                state.refresh_view();
                Ok(entity)
            }
            Err(e) => Err(self.record(notice, e)),
        }
    }

    pub async fn update(&self, id: &str, patch: &E::Patch) -> Result<E> {
        let subject = self.require(id, "update")?;
        let notice = format!("Failed to update {}", subject);
        if let Err(e) = patch.validate() {
            return Err(self.record(notice, e));
        }

        let request = ApiRequest::put(entity_path(E::RESOURCE, id, None)).json(patch);
        self.confirm(notice, request).await
    }

    /// `PATCH /<resource>/:id/<action>` with no body
    pub async fn transition(&self, id: &str, action: &str) -> Result<E> {
        let subject = self.require(id, action)?;
        let request = ApiRequest::patch(entity_path(E::RESOURCE, id, Some(action)));
        self.confirm(format!("Failed to {} {}", action, subject), Ok(request))
            .await
    }

    /// `PATCH /<resource>/:id/<action>` with a JSON body; `verb` names the
    /// operation in the error notice.
    pub(crate) async fn transition_with<B: Serialize + ?Sized>(
        &self,
        id: &str,
        action: &str,
        verb: &str,
        body: &B,
    ) -> Result<E> {
        let subject = self.require(id, verb)?;
        let request = ApiRequest::patch(entity_path(E::RESOURCE, id, Some(action))).json(body);
        self.confirm(format!("Failed to {} {}", verb, subject), request)
            .await
    }

    /// Delete remotely; the local copy goes only once the backend agrees
    pub async fn remove(&self, id: &str) -> Result<()> {
        let subject = self.require(id, "delete")?;
        let request = ApiRequest::delete(entity_path(E::RESOURCE, id, None));

        match self.gateway.execute(&request).await {
            Ok(()) => {
                let mut state = self.lock();
                state.items.retain(|e| e.id() != id);
                if state.selected_id.as_deref() == Some(id) {
                    state.selected_id = None;
                }
                state.error = None;
                state.refresh_view();
                tracing::info!(resource = E::RESOURCE, id, "Deleted");
                Ok(())
            }
            Err(e) => Err(self.record(format!("Failed to delete {}", subject), e)),
        }
    }

    /// Replace the collection with `ordered` at once, then persist the new
    /// order. The previous order comes back if the backend refuses.
    ///
    /// `ordered` must hold every entity of the collection exactly once.
    pub async fn reorder(&self, mut ordered: Vec<E>) -> Result<()> {
        let notice = format!("Failed to reorder {}", E::RESOURCE);
        if let Err(e) = self.check_permutation(&ordered) {
            return Err(self.record(notice, e));
        }

        for (i, entity) in ordered.iter_mut().enumerate() {
            entity.set_order(i as i64);
        }
        let request = {
            let positions: Vec<Position<'_>> = ordered
                .iter()
                .enumerate()
                .map(|(i, e)| Position {
                    id: e.id(),
                    order: i as i64,
                })
                .collect();
            ApiRequest::patch(format!("/{}/reorder", E::RESOURCE)).json(&positions)
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => return Err(self.record(notice, e)),
        };

        let result = mutation::run(
            &self.state,
            RollbackPolicy::Restore,
            format!("reorder {}", E::RESOURCE),
            |state| {
                state.items = ordered;
                state.refresh_view();
            },
            self.gateway.execute(&request),
        )
        .await;

        match result {
            Ok(()) => {
                self.lock().error = None;
                Ok(())
            }
            Err(e) => Err(self.record(notice, e)),
        }
    }

    fn check_permutation(&self, ordered: &[E]) -> Result<()> {
        let state = self.lock();
        let mut seen = HashSet::new();
        for entity in ordered {
            if state.position(entity.id()).is_none() {
                return Err(Error::not_found(E::KIND, entity.id()));
            }
            if !seen.insert(entity.id()) {
                return Err(Error::validation(format!(
                    "{} {} appears twice in the new order",
                    E::KIND,
                    entity.id()
                )));
            }
        }
        if seen.len() != state.items.len() {
            return Err(Error::validation(format!(
                "new order must include every {} ({} of {})",
                E::KIND,
                seen.len(),
                state.items.len()
            )));
        }
        Ok(())
    }

    // ------------------------------------------
    // Helpers for the per-entity stores
    // ------------------------------------------

    /// Send `request` and replace the local copy with the server's answer
    async fn confirm(&self, notice: String, request: Result<ApiRequest>) -> Result<E> {
        let result = match request {
            Ok(request) => self.gateway.fetch::<E>(&request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(entity) => {
                self.replace(entity.clone());
                self.lock().error = None;
                Ok(entity)
            }
            Err(e) => Err(self.record(notice, e)),
        }
    }

    /// Title of a locally known entity, or a not-found error in the slot
    pub(crate) fn require(&self, id: &str, verb: &str) -> Result<String> {
        let title = {
            let state = self.lock();
            state.position(id).map(|i| state.items[i].title().to_string())
        };
        title.ok_or_else(|| {
            self.record(
                format!("Failed to {} {} {}", verb, E::KIND, id),
                Error::not_found(E::KIND, id),
            )
        })
    }

    /// Replace the entity with the same id; never inserts
    pub(crate) fn replace(&self, entity: E) -> bool {
        let mut state = self.lock();
        match state.position(entity.id()) {
            Some(i) => {
                state.items[i] = entity;
                state.refresh_view();
                true
            }
            None => false,
        }
    }

    /// Edit an entity in place and recompute the view
    pub(crate) fn modify<R>(&self, id: &str, change: impl FnOnce(&mut E) -> R) -> Option<R> {
        let mut state = self.lock();
        let i = state.position(id)?;
        let out = change(&mut state.items[i]);
        state.refresh_view();
        Some(out)
    }

    /// Put `error` in the slot under `notice` and hand it back
    pub(crate) fn record(&self, notice: String, error: Error) -> Error {
        tracing::warn!(resource = E::RESOURCE, error = %error, "{}", notice);
        let mut state = self.lock();
        state.is_loading = false;
        state.error = Some(StoreError::new(notice, &error));
        error
    }
}

fn page_info(pagination: Option<Pagination>, page: u32, loaded: usize) -> PageInfo {
    match pagination {
        Some(p) => PageInfo {
            current_page: p.page,
            total_pages: p.total_pages,
            total_items: p.total,
        },
        None => PageInfo {
            current_page: page.max(1),
            total_pages: page.max(1),
            total_items: loaded as u64,
        },
    }
}
