// SPDX-License-Identifier: MPL-2.0

//! Monitoring lists: named read sets with a heartbeat-based lapse.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::types::{ParameterInstanceId, ParameterInstancePath};
use crate::responses::{
    MonitoringListId, MonitoringListInfo, MonitoringListResponse, MonitoringListValuesResponse,
    MonitoringListsResponse, ParameterResponse,
};
use crate::service::ParameterService;
use crate::status::StatusCode;
use crate::sync::future::{resolved_future, Future, Promise};

pub(crate) struct MonitoringList {
    pub id: MonitoringListId,
    pub timeout_seconds: u16,
    /// Resolved targets; unresolvable slots keep their resolution error in
    /// the cached results.
    pub targets: Vec<Option<ParameterInstanceId>>,
    /// Result cache, positionally aligned with the targets.
    pub results: Vec<ParameterResponse>,
    pub last_access: Instant,
}

/// The monitoring lists of a service, guarded by the service's param mutex.
pub struct MonitoringListCollection {
    lists: HashMap<MonitoringListId, MonitoringList>,
    next_id: MonitoringListId,
}

impl MonitoringListCollection {
    pub fn new() -> Self {
        MonitoringListCollection {
            lists: HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn create(
        &mut self,
        targets: Vec<Option<ParameterInstanceId>>,
        results: Vec<ParameterResponse>,
        timeout_seconds: u16,
    ) -> Result<MonitoringListInfo, StatusCode> {
        if timeout_seconds == 0 {
            // one-shot lists are pointless; a plain read covers that
            return Err(StatusCode::InvalidTimeout);
        }
        let id = self.next_id;
        self.next_id += 1;
        let info = MonitoringListInfo {
            id,
            timeout_seconds,
            parameter_count: targets.len(),
        };
        self.lists.insert(
            id,
            MonitoringList {
                id,
                timeout_seconds,
                targets,
                results,
                last_access: Instant::now(),
            },
        );
        Ok(info)
    }

    pub(crate) fn get_mut(&mut self, id: MonitoringListId) -> Option<&mut MonitoringList> {
        match self.lists.get_mut(&id) {
            Some(list) => {
                list.last_access = Instant::now();
                Some(list)
            }
            None => None,
        }
    }

    pub(crate) fn info(&mut self, id: MonitoringListId) -> Option<MonitoringListInfo> {
        self.get_mut(id).map(|list| MonitoringListInfo {
            id: list.id,
            timeout_seconds: list.timeout_seconds,
            parameter_count: list.targets.len(),
        })
    }

    pub(crate) fn infos(&self) -> Vec<MonitoringListInfo> {
        let mut infos: Vec<MonitoringListInfo> = self
            .lists
            .values()
            .map(|list| MonitoringListInfo {
                id: list.id,
                timeout_seconds: list.timeout_seconds,
                parameter_count: list.targets.len(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub(crate) fn delete(&mut self, id: MonitoringListId) -> StatusCode {
        if self.lists.remove(&id).is_some() {
            StatusCode::Success
        } else {
            StatusCode::UnknownMonitoringList
        }
    }

    /// Evicts lists whose last access exceeded their timeout.
    pub fn cleanup_monitoring_lists(&mut self) {
        let now = Instant::now();
        self.lists.retain(|id, list| {
            let keep = now.saturating_duration_since(list.last_access)
                <= Duration::from_secs(u64::from(list.timeout_seconds));
            if !keep {
                warn!("Monitoring list {id} has lapsed, evicting");
            }
            keep
        });
    }
}

impl Default for MonitoringListCollection {
    fn default() -> Self {
        MonitoringListCollection::new()
    }
}

impl ParameterService {
    /// Creates a monitoring list over numeric targets.
    pub fn create_monitoring_list(
        self: &Arc<Self>,
        ids: Vec<ParameterInstanceId>,
        timeout_seconds: u16,
    ) -> Future<MonitoringListResponse> {
        let mut state = self.state.lock();
        let mut result = vec![ParameterResponse::default(); ids.len()];
        let items = Self::resolve_id_targets(&mut state, &ids, &mut result);
        let targets = items.iter().map(|i| i.as_ref().map(|r| r.id)).collect();
        let response = match state.monitoring.create(targets, result, timeout_seconds) {
            Ok(info) => {
                let mut response = MonitoringListResponse::new(StatusCode::Success);
                response.monitoring_list = Some(info);
                response
            }
            Err(status) => MonitoringListResponse::new(status),
        };
        resolved_future(response)
    }

    /// Creates a monitoring list over textual targets.
    pub fn create_monitoring_list_with_paths(
        self: &Arc<Self>,
        paths: Vec<ParameterInstancePath>,
        timeout_seconds: u16,
    ) -> Future<MonitoringListResponse> {
        let mut state = self.state.lock();
        let mut result = vec![ParameterResponse::default(); paths.len()];
        let items = Self::resolve_path_targets(&mut state, &paths, &mut result);
        let targets = items.iter().map(|i| i.as_ref().map(|r| r.id)).collect();
        let response = match state.monitoring.create(targets, result, timeout_seconds) {
            Ok(info) => {
                let mut response = MonitoringListResponse::new(StatusCode::Success);
                response.monitoring_list = Some(info);
                response
            }
            Err(status) => MonitoringListResponse::new(status),
        };
        resolved_future(response)
    }

    /// Batched read restricted to the list; refreshes the list's heartbeat
    /// and its result cache.
    pub fn get_values_for_monitoring_list(
        self: &Arc<Self>,
        id: MonitoringListId,
    ) -> Future<MonitoringListValuesResponse> {
        let (items, result) = {
            let mut state = self.state.lock();
            let Some(list) = state.monitoring.get_mut(id) else {
                return resolved_future(MonitoringListValuesResponse::new(
                    StatusCode::UnknownMonitoringList,
                ));
            };
            let targets = list.targets.clone();
            let mut result = list.results.clone();
            // clear the cached slots of resolvable targets for this pass
            for (target, cached) in targets.iter().zip(result.iter_mut()) {
                if target.is_some() {
                    cached.status = StatusCode::NoErrorYet;
                    cached.value = None;
                }
            }
            let items: Vec<_> = targets
                .iter()
                .zip(result.iter_mut())
                .map(|(target, response)| {
                    target.and_then(|target_id| {
                        match Self::resolve_id_target(&mut state, target_id) {
                            Ok(item) => Some(item),
                            Err(status) => {
                                response.status = status;
                                response.id = Some(target_id);
                                None
                            }
                        }
                    })
                })
                .collect();
            (items, result)
        };

        let read_future = self.get_parameters_internal(&items, result, false);

        let service = Arc::clone(self);
        let promise = Arc::new(Promise::new());
        let future = promise.take_future().expect("fresh promise");
        {
            let promise = Arc::clone(&promise);
            read_future.set_error_notifier(move |err| {
                let _ = promise.set_error(err);
            });
        }
        read_future.set_notifier(move |responses: Vec<ParameterResponse>| {
            // write the fresh values back into the cache
            {
                let mut state = service.state.lock();
                if let Some(list) = state.monitoring.get_mut(id) {
                    if list.results.len() == responses.len() {
                        list.results = responses.clone();
                    }
                }
            }
            debug!("Monitoring list {id} delivered {} values", responses.len());
            let _ = promise.set_value(MonitoringListValuesResponse::with_values(responses));
        });
        future
    }

    /// Info for one list.
    pub fn get_monitoring_list(
        self: &Arc<Self>,
        id: MonitoringListId,
    ) -> Future<MonitoringListResponse> {
        let mut state = self.state.lock();
        let response = match state.monitoring.info(id) {
            Some(info) => {
                let mut response = MonitoringListResponse::new(StatusCode::Success);
                response.monitoring_list = Some(info);
                response
            }
            None => MonitoringListResponse::new(StatusCode::UnknownMonitoringList),
        };
        resolved_future(response)
    }

    /// Deletes one list.
    pub fn delete_monitoring_list(self: &Arc<Self>, id: MonitoringListId) -> Future<crate::responses::Response> {
        let status = self.state.lock().monitoring.delete(id);
        resolved_future(crate::responses::Response::new(status))
    }

    /// Infos for all lists.
    pub fn get_all_monitoring_lists(self: &Arc<Self>) -> Future<MonitoringListsResponse> {
        let state = self.state.lock();
        let response = MonitoringListsResponse {
            status: StatusCode::Success,
            monitoring_lists: state.monitoring.infos(),
        };
        resolved_future(response)
    }
}
