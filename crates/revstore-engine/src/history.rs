//! Revision history and trash for a single identity.

use std::ops::ControlFlow;

use revstore_storage::MetaDataKey;
use revstore_types::{
    Action, HistoryRequest, ListResponse, ListSource, ResourceError, ResourceKey, VersionMatch,
};

use crate::backend::{collect_page, ListItem, StorageBackend};
use crate::continue_token::ContinueToken;

impl StorageBackend {
    /// Visit the stored revisions of one identity.
    ///
    /// Rows are filtered by the version match mode. In the default mode
    /// without an explicit revision only rows after the most recent
    /// deletion are shown. Rows are newest first, except for
    /// `NotOlderThan` or when the continue token asks for ascending order.
    /// Each row's token carries its RV so the next page resumes after it.
    /// Returns a freshly minted version.
    pub fn list_history<F>(&self, req: &HistoryRequest, mut visit: F) -> Result<i64, ResourceError>
    where
        F: FnMut(ListItem) -> ControlFlow<()>,
    {
        let key = history_key(req)?;
        if req.source == ListSource::Trash {
            return self.list_trash(&key, visit);
        }
        if req.version_match == VersionMatch::Exact && req.resource_version <= 0 {
            return Err(ResourceError::Validation(
                "exact version match requires a resource version".to_string(),
            ));
        }
        let token = ContinueToken::parse_optional(&req.next_page_token)?;

        let mut rows = self
            .meta
            .keys(&key.as_list_key())
            .collect::<Result<Vec<MetaDataKey>, _>>()?;

        let wanted = req.resource_version;
        match req.version_match {
            VersionMatch::Exact => rows.retain(|k| k.resource_version == wanted),
            VersionMatch::NotOlderThan => rows.retain(|k| k.resource_version >= wanted),
            VersionMatch::Unset if wanted > 0 => rows.retain(|k| k.resource_version <= wanted),
            VersionMatch::Unset => {
                let last_delete = rows
                    .iter()
                    .filter(|k| k.action == Action::Deleted)
                    .map(|k| k.resource_version)
                    .max();
                if let Some(last_delete) = last_delete {
                    rows.retain(|k| k.resource_version > last_delete);
                }
            }
        }

        let ascending = req.version_match == VersionMatch::NotOlderThan
            || token.is_some_and(|t| t.sort_ascending);
        if ascending {
            rows.sort_by_key(|k| k.resource_version);
        } else {
            rows.sort_by_key(|k| std::cmp::Reverse(k.resource_version));
        }

        if let Some(token) = token {
            let last_seen = token.resource_version;
            rows.retain(|k| {
                if ascending {
                    k.resource_version > last_seen
                } else {
                    k.resource_version < last_seen
                }
            });
        }

        let list_rv = self.rv.next();
        let cap = if req.limit > 0 { req.limit.saturating_add(1) } else { i64::MAX };
        let resumed_at = token.map_or(0, |t| t.start_offset);
        for (position, row) in (1i64..).zip(rows.iter()) {
            if position > cap {
                break;
            }
            let item = ListItem {
                response: self.response_for(row)?,
                continue_token: ContinueToken::new(
                    resumed_at.saturating_add(position),
                    row.resource_version,
                )
                .ascending(ascending)
                .encode(),
            };
            if visit(item).is_break() {
                break;
            }
        }
        Ok(list_rv)
    }

    /// One page of history.
    pub fn history(&self, req: &HistoryRequest) -> Result<ListResponse, ResourceError> {
        collect_page(req.limit, |visit| self.list_history(req, visit))
    }

    /// The most recent deletion of `key`, unless it was recreated since.
    fn list_trash<F>(&self, key: &ResourceKey, mut visit: F) -> Result<i64, ResourceError>
    where
        F: FnMut(ListItem) -> ControlFlow<()>,
    {
        let list_rv = self.rv.next();
        match self.meta.get_latest_resource_key(key) {
            Ok(_) => return Ok(list_rv),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let mut tombstone = None;
        for item in self.meta.keys(&key.as_list_key()) {
            let row = item?;
            if row.action == Action::Deleted {
                tombstone = Some(row);
            }
        }
        let Some(row) = tombstone else {
            return Ok(list_rv);
        };
        let item = ListItem {
            response: self.response_for(&row)?,
            continue_token: ContinueToken::new(1, row.resource_version).encode(),
        };
        // At most one row, so stopping early leaves nothing unvisited.
        match visit(item) {
            ControlFlow::Continue(()) | ControlFlow::Break(()) => Ok(list_rv),
        }
    }
}

fn history_key(req: &HistoryRequest) -> Result<ResourceKey, ResourceError> {
    let key = req.key.to_resource_key().ok_or_else(|| {
        ResourceError::Validation(
            "history requires namespace, group, resource and name".to_string(),
        )
    })?;
    key.validate().map_err(ResourceError::Validation)?;
    Ok(key)
}
