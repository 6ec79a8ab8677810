//! 연결 레지스트리.
//!
//! 룸 → 라이브 WebSocket 연결 매핑을 관리합니다. 모든 인바운드 연결과 모든 브로드캐스트가
//! 접근하는 구조이므로 룸 단위 `DashMap` 샤드 잠금만 사용합니다.
//! 두 맵(룸별 연결, 연결 → 룸 역인덱스)의 잠금은 동시에 잡지 않습니다.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 연결 식별자.
pub type ConnectionId = u64;

/// 연결별 송신 큐에 들어가는 항목.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// 직렬화된 텍스트 프레임
    Frame(Arc<str>),
    /// 남은 프레임을 보낸 뒤 연결 종료
    Close,
}

/// 레지스트리에 등록된 연결 핸들.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub room_id: String,
    pub wallet: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Outbound>,
    last_ping: Arc<AtomicI64>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// 송신 큐.
    pub fn sender(&self) -> &mpsc::Sender<Outbound> {
        &self.sender
    }

    /// 전송 계층 종료 신호.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 마지막 ping 시각 (Unix 밀리초).
    pub fn last_ping_millis(&self) -> i64 {
        self.last_ping.load(Ordering::Relaxed)
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: self.id,
            wallet: self.wallet.clone(),
            last_ping: DateTime::from_timestamp_millis(self.last_ping_millis())
                .unwrap_or(self.connected_at),
            connected_at: self.connected_at,
        }
    }
}

/// 연결 조회용 정보.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub wallet: String,
    pub last_ping: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
}

/// 연결 레지스트리.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    rooms: DashMap<String, HashMap<ConnectionId, ConnectionHandle>>,
    index: DashMap<ConnectionId, String>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 연결 등록.
    pub fn register(
        &self,
        room_id: &str,
        wallet: &str,
        sender: mpsc::Sender<Outbound>,
    ) -> ConnectionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let handle = ConnectionHandle {
            id,
            room_id: room_id.to_string(),
            wallet: wallet.to_string(),
            connected_at: now,
            sender,
            last_ping: Arc::new(AtomicI64::new(now.timestamp_millis())),
            cancel: CancellationToken::new(),
        };

        self.index.insert(id, room_id.to_string());
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(id, handle.clone());

        tracing::debug!(room_id = %room_id, wallet = %wallet, connection_id = id, "Connection registered");
        handle
    }

    /// 연결 제거 (전송 계층 종료 신호 포함). 없으면 no-op.
    pub fn unregister(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let handle = self.detach(id)?;
        handle.cancel.cancel();
        tracing::debug!(room_id = %handle.room_id, connection_id = id, "Connection unregistered");
        Some(handle)
    }

    /// 종료 신호 없이 레지스트리에서만 제거합니다.
    fn detach(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let (_, room_id) = self.index.remove(&id)?;

        let handle = {
            let mut bucket = self.rooms.get_mut(&room_id)?;
            bucket.remove(&id)
        };
        self.rooms.remove_if(&room_id, |_, bucket| bucket.is_empty());
        handle
    }

    /// 룸의 모든 연결을 레지스트리에서 제거하고 `Close`를 큐에 넣습니다.
    ///
    /// 큐가 가득 찬 연결은 즉시 종료 신호를 보냅니다. 제거된 연결 수를 반환합니다.
    pub fn close_room(&self, room_id: &str) -> usize {
        let Some((_, bucket)) = self.rooms.remove(room_id) else {
            return 0;
        };

        for (id, handle) in &bucket {
            self.index.remove(id);
            Self::queue_close(handle);
        }
        bucket.len()
    }

    /// 연결을 레지스트리에서 제거하고 `Close`를 큐에 넣습니다.
    ///
    /// 이미 큐에 들어간 프레임은 종료 전에 전송됩니다. 없으면 `false`.
    pub fn close_connection(&self, id: ConnectionId) -> bool {
        match self.detach(id) {
            Some(handle) => {
                Self::queue_close(&handle);
                true
            }
            None => false,
        }
    }

    /// 룸에서 해당 지갑의 연결을 모두 닫습니다. 닫은 연결 수를 반환합니다.
    pub fn close_wallet(&self, room_id: &str, wallet: &str) -> usize {
        let ids: Vec<ConnectionId> = self
            .rooms
            .get(room_id)
            .map(|bucket| {
                bucket
                    .values()
                    .filter(|h| h.wallet == wallet)
                    .map(|h| h.id)
                    .collect()
            })
            .unwrap_or_default();

        ids.into_iter().filter(|id| self.close_connection(*id)).count()
    }

    fn queue_close(handle: &ConnectionHandle) {
        if handle.sender.try_send(Outbound::Close).is_err() {
            handle.cancel.cancel();
        }
    }

    /// 룸의 연결 정보 목록.
    pub fn list_connections(&self, room_id: &str) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .rooms
            .get(room_id)
            .map(|bucket| bucket.values().map(ConnectionHandle::info).collect())
            .unwrap_or_default();
        infos.sort_by_key(|info| info.connection_id);
        infos
    }

    /// 브로드캐스트용 연결 스냅샷 (ID 오름차순).
    pub fn snapshot(&self, room_id: &str) -> Vec<ConnectionHandle> {
        let mut handles: Vec<ConnectionHandle> = self
            .rooms
            .get(room_id)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default();
        handles.sort_by_key(|h| h.id);
        handles
    }

    /// ID로 연결 조회.
    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let room_id = self.index.get(&id)?.value().clone();
        let bucket = self.rooms.get(&room_id)?;
        bucket.get(&id).cloned()
    }

    /// ping 시각 갱신.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(handle) = self.get(id) {
            handle
                .last_ping
                .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
    }

    /// 마지막 ping이 `max_idle`을 넘긴 연결을 제거하고 전송 계층을 닫습니다.
    pub fn prune_stale(&self, max_idle: Duration) -> Vec<ConnectionInfo> {
        self.prune_stale_at(max_idle, Utc::now())
    }

    pub fn prune_stale_at(&self, max_idle: Duration, now: DateTime<Utc>) -> Vec<ConnectionInfo> {
        let cutoff = now.timestamp_millis() - max_idle.as_millis() as i64;

        let stale: Vec<ConnectionId> = self
            .rooms
            .iter()
            .flat_map(|bucket| {
                bucket
                    .values()
                    .filter(|h| h.last_ping_millis() < cutoff)
                    .map(|h| h.id)
                    .collect::<Vec<_>>()
            })
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.unregister(id))
            .map(|handle| {
                tracing::info!(
                    room_id = %handle.room_id,
                    wallet = %handle.wallet,
                    connection_id = handle.id,
                    "Pruned stale connection"
                );
                handle.info()
            })
            .collect()
    }

    /// 룸의 연결 수.
    pub fn connection_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|b| b.len()).unwrap_or(0)
    }

    /// 전체 연결 수.
    pub fn total_connections(&self) -> usize {
        self.index.len()
    }

    #[cfg(test)]
    pub(crate) fn set_last_ping(&self, id: ConnectionId, millis: i64) {
        if let Some(handle) = self.get(id) {
            handle.last_ping.store(millis, Ordering::Relaxed);
        }
    }
}
