//! View registry: which views exist, their order, and the primary designation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::services::ServiceContext;
use crate::types::{Server, ServerId, View, ViewEvent, ViewId, ViewKind};

/// Single source of truth for open views
///
/// Pure bookkeeping; never touches native resources.
pub struct ViewRegistry {
    ctx: Arc<ServiceContext>,
    views: HashMap<ViewId, View>,
    order: HashMap<ServerId, Vec<ViewId>>,
    primary: HashMap<ServerId, ViewId>,
}

impl ViewRegistry {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            ctx,
            views: HashMap::new(),
            order: HashMap::new(),
            primary: HashMap::new(),
        }
    }

    // ===== Creation / removal =====

    /// Create a view at the end of its server's order
    ///
    /// The first view of a server becomes its primary.
    pub fn create_view(
        &mut self,
        server: &Server,
        kind: ViewKind,
        initial_path: Option<String>,
        parent_view_id: Option<ViewId>,
    ) -> CoreResult<ViewId> {
        let limit = self.ctx.config.view_limit();
        if self.views.len() >= limit {
            return Err(CoreError::ViewLimitReached { limit });
        }

        let view = View::new(server, kind, initial_path, parent_view_id);
        let view_id = view.id;
        let server_id = view.server_id.clone();
        self.views.insert(view_id, view);
        self.order.entry(server_id.clone()).or_default().push(view_id);
        log::info!("View {view_id} created for server {server_id} ({kind:?})");

        self.ctx.emit(ViewEvent::ViewCreated {
            view_id,
            server_id: server_id.clone(),
            kind,
        });
        if !self.primary.contains_key(&server_id) {
            self.primary.insert(server_id.clone(), view_id);
            self.ctx.emit(ViewEvent::PrimaryChanged {
                server_id,
                view_id: Some(view_id),
            });
        }
        Ok(view_id)
    }

    /// Remove a view; `None` if it was unknown
    pub fn remove_view(&mut self, view_id: ViewId) -> Option<View> {
        let view = self.views.remove(&view_id)?;
        let server_id = view.server_id.clone();

        let remaining = self.order.get_mut(&server_id).map_or(0, |order| {
            order.retain(|id| *id != view_id);
            order.len()
        });
        if remaining == 0 {
            self.order.remove(&server_id);
        }

        if self.primary.get(&server_id) == Some(&view_id) {
            let next = self
                .order
                .get(&server_id)
                .and_then(|order| order.first().copied());
            match next {
                Some(next) => {
                    self.primary.insert(server_id.clone(), next);
                }
                None => {
                    self.primary.remove(&server_id);
                }
            }
            log::debug!("Primary view of {server_id} is now {next:?}");
            self.ctx.emit(ViewEvent::PrimaryChanged {
                server_id: server_id.clone(),
                view_id: next,
            });
        }

        log::info!("View {view_id} removed");
        self.ctx.emit(ViewEvent::ViewRemoved { view_id, server_id });
        Some(view)
    }

    /// Remove every view of a server, emitting one aggregate signal
    pub fn remove_server_views(&mut self, server_id: &ServerId) -> Vec<View> {
        let ids = self.order.remove(server_id).unwrap_or_default();
        self.primary.remove(server_id);
        let removed: Vec<View> = ids.iter().filter_map(|id| self.views.remove(id)).collect();
        if removed.is_empty() {
            return removed;
        }

        log::info!("Removed {} views of server {server_id}", removed.len());
        self.ctx.emit(ViewEvent::ServerViewsRemoved {
            server_id: server_id.clone(),
            view_ids: ids,
        });
        removed
    }

    // ===== Primary designation =====

    /// Make `view_id` the primary of its server; `true` if the designation changed
    pub fn set_primary(&mut self, view_id: ViewId) -> bool {
        let Some(view) = self.views.get(&view_id) else {
            return false;
        };
        let server_id = view.server_id.clone();
        if self.primary.get(&server_id) == Some(&view_id) {
            return false;
        }
        self.primary.insert(server_id.clone(), view_id);
        self.ctx.emit(ViewEvent::PrimaryChanged {
            server_id,
            view_id: Some(view_id),
        });
        true
    }

    pub fn is_primary(&self, view_id: ViewId) -> bool {
        self.views
            .get(&view_id)
            .is_some_and(|view| self.primary.get(&view.server_id) == Some(&view_id))
    }

    pub fn primary_for(&self, server_id: &ServerId) -> Option<ViewId> {
        self.primary.get(server_id).copied()
    }

    // ===== Ordering =====

    /// Replace a server's display order
    ///
    /// Unknown and duplicate ids are dropped; known ids missing from `new_order` keep
    /// their relative order at the end. Returns the stored order.
    pub fn reorder(&mut self, server_id: &ServerId, new_order: &[ViewId]) -> Vec<ViewId> {
        let Some(current) = self.order.get_mut(server_id) else {
            return Vec::new();
        };

        let known: HashSet<ViewId> = current.iter().copied().collect();
        let mut seen = HashSet::with_capacity(current.len());
        let mut next: Vec<ViewId> = new_order
            .iter()
            .copied()
            .filter(|id| known.contains(id) && seen.insert(*id))
            .collect();
        next.extend(current.iter().copied().filter(|id| !seen.contains(id)));

        current.clone_from(&next);
        next
    }

    pub fn order(&self, server_id: &ServerId) -> &[ViewId] {
        self.order.get(server_id).map_or(&[], Vec::as_slice)
    }

    // ===== View state =====

    pub fn get(&self, view_id: ViewId) -> Option<&View> {
        self.views.get(&view_id)
    }

    pub fn contains(&self, view_id: ViewId) -> bool {
        self.views.contains_key(&view_id)
    }

    /// Views of a server in display order
    pub fn views_for_server(&self, server_id: &ServerId) -> Vec<&View> {
        self.order(server_id)
            .iter()
            .filter_map(|id| self.views.get(id))
            .collect()
    }

    /// WINDOW-kind views of a server
    pub fn window_views_for_server(&self, server_id: &ServerId) -> Vec<ViewId> {
        self.views_for_server(server_id)
            .into_iter()
            .filter(|view| view.kind == ViewKind::Window)
            .map(|view| view.id)
            .collect()
    }

    /// An existing WINDOW view of `server_id` opened on `path`
    pub fn find_window_view(&self, server_id: &ServerId, path: &str) -> Option<ViewId> {
        self.views_for_server(server_id)
            .into_iter()
            .find(|view| view.kind == ViewKind::Window && view.initial_path.as_deref() == Some(path))
            .map(|view| view.id)
    }

    /// Change a view's kind; `true` if it changed
    pub fn set_kind(&mut self, view_id: ViewId, kind: ViewKind) -> bool {
        let Some(view) = self.views.get_mut(&view_id) else {
            return false;
        };
        if view.kind == kind {
            return false;
        }
        view.kind = kind;
        self.ctx.emit(ViewEvent::ViewKindChanged { view_id, kind });
        true
    }

    /// Update channel/team names; emits only when something changed
    pub fn update_title(
        &mut self,
        view_id: ViewId,
        channel_name: Option<String>,
        team_name: Option<String>,
    ) -> bool {
        let Some(view) = self.views.get_mut(&view_id) else {
            return false;
        };
        if view.title.channel_name == channel_name && view.title.team_name == team_name {
            return false;
        }
        view.title.channel_name.clone_from(&channel_name);
        view.title.team_name.clone_from(&team_name);
        self.ctx.emit(ViewEvent::TitleUpdated {
            view_id,
            channel_name,
            team_name,
        });
        true
    }

    pub fn display_title(&self, view_id: ViewId) -> Option<String> {
        self.views.get(&view_id).map(|view| view.title.display())
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn is_limit_reached(&self) -> bool {
        self.views.len() >= self.ctx.config.view_limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_context, drain_events, test_server};
    use crate::types::OrchestratorConfig;

    fn registry_with_limit(limit: usize) -> (ViewRegistry, tokio::sync::broadcast::Receiver<ViewEvent>) {
        let config = OrchestratorConfig {
            view_limit: limit,
            ..OrchestratorConfig::default()
        };
        let ctx = create_test_context(config).ctx;
        let rx = ctx.events.subscribe();
        (ViewRegistry::new(ctx), rx)
    }

    #[test]
    fn first_view_becomes_primary() {
        let (mut registry, mut rx) = registry_with_limit(15);
        let server = test_server("s1");

        let first = registry
            .create_view(&server, ViewKind::Embedded, None, None)
            .unwrap();
        let second = registry
            .create_view(&server, ViewKind::Embedded, None, None)
            .unwrap();

        assert!(registry.is_primary(first));
        assert!(!registry.is_primary(second));
        assert_eq!(registry.order(&server.id), &[first, second]);

        let primaries: Vec<_> = drain_events(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ViewEvent::PrimaryChanged { .. }))
            .collect();
        assert_eq!(
            primaries,
            vec![ViewEvent::PrimaryChanged {
                server_id: server.id.clone(),
                view_id: Some(first)
            }]
        );
    }

    #[test]
    fn create_refused_at_limit() {
        let (mut registry, _rx) = registry_with_limit(2);
        let server = test_server("s1");
        registry
            .create_view(&server, ViewKind::Embedded, None, None)
            .unwrap();
        registry
            .create_view(&server, ViewKind::Embedded, None, None)
            .unwrap();

        let result = registry.create_view(&server, ViewKind::Embedded, None, None);
        assert!(matches!(result, Err(CoreError::ViewLimitReached { limit: 2 })));
        assert_eq!(registry.len(), 2);
        assert!(registry.is_limit_reached());
    }

    #[test]
    fn removing_primary_promotes_first_in_order() {
        let (mut registry, mut rx) = registry_with_limit(15);
        let server = test_server("s1");
        let a = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let b = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let c = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        registry.reorder(&server.id, &[a, c, b]);
        drain_events(&mut rx);

        assert!(registry.remove_view(a).is_some());
        assert!(registry.is_primary(c));

        let events = drain_events(&mut rx);
        assert_eq!(
            events,
            vec![
                ViewEvent::PrimaryChanged {
                    server_id: server.id.clone(),
                    view_id: Some(c)
                },
                ViewEvent::ViewRemoved {
                    view_id: a,
                    server_id: server.id.clone()
                },
            ]
        );
    }

    #[test]
    fn removing_secondary_keeps_primary_quiet() {
        let (mut registry, mut rx) = registry_with_limit(15);
        let server = test_server("s1");
        let a = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let b = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        drain_events(&mut rx);

        registry.remove_view(b);
        assert!(registry.is_primary(a));
        assert!(!drain_events(&mut rx)
            .iter()
            .any(|e| matches!(e, ViewEvent::PrimaryChanged { .. })));
    }

    #[test]
    fn removing_last_view_clears_server_state() {
        let (mut registry, mut rx) = registry_with_limit(15);
        let server = test_server("s1");
        let a = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        drain_events(&mut rx);

        registry.remove_view(a);
        assert_eq!(registry.primary_for(&server.id), None);
        assert!(registry.order(&server.id).is_empty());
        assert!(drain_events(&mut rx).contains(&ViewEvent::PrimaryChanged {
            server_id: server.id.clone(),
            view_id: None
        }));

        // Unknown id is a no-op
        assert!(registry.remove_view(a).is_none());
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn set_primary_emits_only_on_change() {
        let (mut registry, mut rx) = registry_with_limit(15);
        let server = test_server("s1");
        let a = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let b = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        drain_events(&mut rx);

        assert!(!registry.set_primary(a));
        assert!(registry.set_primary(b));
        assert!(!registry.set_primary(b));
        assert!(!registry.set_primary(ViewId::new()));
        assert_eq!(drain_events(&mut rx).len(), 1);
        assert!(registry.is_primary(b));
        assert!(!registry.is_primary(a));
    }

    #[test]
    fn reorder_round_trips_permutation() {
        let (mut registry, _rx) = registry_with_limit(15);
        let server = test_server("s1");
        let a = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let b = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let c = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();

        registry.reorder(&server.id, &[c, a, b]);
        assert_eq!(registry.order(&server.id), &[c, a, b]);
    }

    #[test]
    fn reorder_drops_unknown_and_appends_missing() {
        let (mut registry, _rx) = registry_with_limit(15);
        let server = test_server("s1");
        let a = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let b = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let c = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();

        let stored = registry.reorder(&server.id, &[ViewId::new(), c, c]);
        assert_eq!(stored, vec![c, a, b]);
        assert_eq!(registry.order(&server.id), &[c, a, b]);
    }

    #[test]
    fn remove_server_views_emits_one_aggregate_signal() {
        let (mut registry, mut rx) = registry_with_limit(15);
        let s1 = test_server("s1");
        let s2 = test_server("s2");
        let a = registry.create_view(&s1, ViewKind::Embedded, None, None).unwrap();
        let b = registry.create_view(&s1, ViewKind::Window, None, None).unwrap();
        let other = registry.create_view(&s2, ViewKind::Embedded, None, None).unwrap();
        drain_events(&mut rx);

        let removed = registry.remove_server_views(&s1.id);
        assert_eq!(removed.len(), 2);
        assert_eq!(
            drain_events(&mut rx),
            vec![ViewEvent::ServerViewsRemoved {
                server_id: s1.id.clone(),
                view_ids: vec![a, b]
            }]
        );
        assert_eq!(registry.primary_for(&s1.id), None);
        assert!(registry.is_primary(other));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn titles_and_window_lookup() {
        let (mut registry, mut rx) = registry_with_limit(15);
        let server = test_server("s1");
        let tab = registry.create_view(&server, ViewKind::Embedded, None, None).unwrap();
        let popout = registry
            .create_view(&server, ViewKind::Window, Some("/team/pl/1".to_string()), Some(tab))
            .unwrap();
        drain_events(&mut rx);

        assert!(registry.update_title(tab, Some("Town Square".into()), Some("Eng".into())));
        assert!(!registry.update_title(tab, Some("Town Square".into()), Some("Eng".into())));
        assert_eq!(
            registry.display_title(tab).as_deref(),
            Some("Town Square - Eng - Server s1")
        );
        assert_eq!(drain_events(&mut rx).len(), 1);

        assert_eq!(registry.find_window_view(&server.id, "/team/pl/1"), Some(popout));
        assert_eq!(registry.find_window_view(&server.id, "/other"), None);
        assert_eq!(registry.window_views_for_server(&server.id), vec![popout]);

        assert!(registry.set_kind(popout, ViewKind::Embedded));
        assert!(!registry.set_kind(popout, ViewKind::Embedded));
        assert!(registry.window_views_for_server(&server.id).is_empty());
    }
}
