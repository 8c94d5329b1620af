//! 上行批次发送 - 按条回执、限次重试
//!
//! 契约（详见模块测试）：
//! - 全程持有批次锁，任一时刻最多一个批次在途
//! - pending map 按 uplink_msg_id 跟踪，只有正向回执才移除
//! - 每轮尝试前重建 latch；正/负回执、超限丢弃都会递减
//! - latch 最多等 10 秒；批次成功 = latch 归零且 pending 为空
//! - 失败则 sleep 后重发 pending 里剩下的；10 轮后告警丢弃并视为成功
//!   （可用性优先的逃生阀，at-least-once 不变式由云端幂等消费兜底）
//! - 重试途中管理器退出初始化态 → 放弃批次，游标不推进

use crate::error::Result;
use crate::events::{EventManager, SdkEvent};
use crate::state::SharedState;
use crate::transport::RpcTransport;
use edgelink_proto::{UplinkMsg, UplinkResponseMsg};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, trace, warn};

/// 单个批次的最大发送轮数
pub const MAX_UPLINK_ATTEMPTS: u32 = 10;

/// 每轮等待回执的上限
const LATCH_WAIT: Duration = Duration::from_secs(10);

/// 一轮尝试的回执闩：remaining 归零即完成
///
/// 回执回调持有派发时捕获的引用，闩在每轮尝试前整体替换。
#[derive(Debug)]
struct AckLatch {
    remaining: AtomicUsize,
    done: Notify,
}

impl AckLatch {
    fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            done: Notify::new(),
        })
    }

    fn count_down(&self) {
        let mut current = self.remaining.load(Ordering::Acquire);
        loop {
            if current == 0 {
                // 多余的回执（迟到的重复 ack）不把计数打穿
                self.done.notify_waiters();
                return;
            }
            match self.remaining.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if current == 1 {
                        self.done.notify_waiters();
                    }
                    return;
                }
                Err(observed) => current = observed,
            }
        }
    }

    async fn wait(&self) {
        loop {
            let notified = self.done.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// 上行批次发送器
pub struct UplinkBatcher {
    transport: Arc<dyn RpcTransport>,
    state: Arc<SharedState>,
    events: Arc<EventManager>,
    sleep_between_batches: Duration,
    latch_wait: Duration,
    /// 批次串行锁：任一时刻最多一个批次在途
    batch_lock: Mutex<()>,
    pending: StdMutex<HashMap<i32, UplinkMsg>>,
    latch: StdMutex<Option<Arc<AckLatch>>>,
}

impl UplinkBatcher {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        state: Arc<SharedState>,
        events: Arc<EventManager>,
        sleep_between_batches: Duration,
    ) -> Self {
        Self {
            transport,
            state,
            events,
            sleep_between_batches,
            latch_wait: LATCH_WAIT,
            batch_lock: Mutex::new(()),
            pending: StdMutex::new(HashMap::new()),
            latch: StdMutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_latch_wait(&mut self, wait: Duration) {
        self.latch_wait = wait;
    }

    /// 发送一个批次。Ok(true) = 已送达或已按策略丢弃（游标可推进）；
    /// Ok(false) = 中途放弃（游标不得推进）。
    pub async fn send_batch(&self, msgs: Vec<UplinkMsg>) -> Result<bool> {
        let _guard = self.batch_lock.lock().await;

        {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            pending.clear();
            for msg in msgs {
                pending.insert(msg.uplink_msg_id, msg);
            }
        }

        let mut attempt: u32 = 1;
        loop {
            let batch: Vec<UplinkMsg> = {
                let pending = self.pending.lock().expect("pending lock poisoned");
                pending.values().cloned().collect()
            };
            trace!("[{}] uplink msg(s) are going to be send.", batch.len());

            let latch = AckLatch::new(batch.len());
            *self.latch.lock().expect("latch lock poisoned") = Some(latch.clone());

            let max_inbound = self.transport.server_max_inbound_size();
            for msg in batch {
                if max_inbound != 0 && msg.serialized_size() > max_inbound {
                    error!(
                        "Uplink msg size [{}] exceeds server max inbound message size [{}]. \
                         Skipping this message. Please increase the max inbound message size \
                         on the server and restart it. Msg id [{}]",
                        msg.serialized_size(),
                        max_inbound,
                        msg.uplink_msg_id
                    );
                    self.pending
                        .lock()
                        .expect("pending lock poisoned")
                        .remove(&msg.uplink_msg_id);
                    latch.count_down();
                } else if let Err(e) = self.transport.send_uplink(msg).await {
                    // 发送失败不递减：等本轮超时后整体重试
                    error!("Failed to send uplink msg: {}", e);
                }
            }

            let mut success = timeout(self.latch_wait, latch.wait()).await.is_ok();
            success = success && self.pending.lock().expect("pending lock poisoned").is_empty();

            if !success {
                let remaining: Vec<i32> = self
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .keys()
                    .copied()
                    .collect();
                warn!("Failed to deliver the batch: {:?}, attempt: {}", remaining, attempt);
            }

            if self.state.is_initialized() && !success {
                sleep(self.sleep_between_batches).await;
            }

            attempt += 1;
            if attempt > MAX_UPLINK_ATTEMPTS {
                let remaining: Vec<i32> = self
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .keys()
                    .copied()
                    .collect();
                warn!(
                    "Failed to deliver the batch after {} attempts. Next messages are going to be discarded {:?}",
                    MAX_UPLINK_ATTEMPTS, remaining
                );
                self.events.emit(SdkEvent::BatchDiscarded {
                    count: remaining.len(),
                });
                self.finish_batch();
                return Ok(true);
            }

            if success {
                self.finish_batch();
                return Ok(true);
            }
            if !self.state.is_initialized() {
                // 管理器已退出初始化态：放弃批次，游标不推进
                self.finish_batch();
                return Ok(false);
            }
        }
    }

    /// 批次结束后 pending 必须清空，闩引用随批次作废
    fn finish_batch(&self) {
        self.pending.lock().expect("pending lock poisoned").clear();
        *self.latch.lock().expect("latch lock poisoned") = None;
    }

    /// 上行回执回调（由传输事件派发线程调用，不阻塞）
    pub fn on_uplink_response(&self, msg: UplinkResponseMsg) {
        if msg.success {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&msg.uplink_msg_id);
            debug!("Msg has been processed successfully! [{}]", msg.uplink_msg_id);
        } else {
            error!(
                "Msg processing failed! [{}] Error msg: {:?}",
                msg.uplink_msg_id, msg.error_msg
            );
        }
        let latch = self.latch.lock().expect("latch lock poisoned").clone();
        if let Some(latch) = latch {
            latch.count_down();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
