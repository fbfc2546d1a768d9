// ==========================================
// 武器改装最优配置求解 - 队列调度 worker 池
// ==========================================
// 结构:
// - 一个轮询任务: 认领 QUEUED 任务（认领即置为 PROCESSING）→ 送入有界通道
//   队列为空或认领出错时休眠 poll_interval
// - N 个 worker: 共享通道接收端,在阻塞线程池中执行求解（CPU 密集）
// 红线:
// - 单个任务失败只影响该任务,worker 继续处理
// - 关闭时先停止认领,再等待通道中已认领的任务全部处理完
// ==========================================

use crate::config::OptimizerConfig;
use crate::domain::queue::QueueEntry;
use crate::repository::queue_repo::EvaluationQueueRepository;
use crate::services::evaluation_service::{EvaluationService, JobOutcome};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// 运行期计数
#[derive(Debug, Default)]
struct PoolCounters {
    claimed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// worker 池统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPoolStats {
    pub claimed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// worker 池启动参数
#[derive(Debug, Clone)]
pub struct WorkerPoolSettings {
    pub worker_count: usize,
    pub channel_capacity: usize,
    pub poll_interval: Duration,
}

impl WorkerPoolSettings {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        let worker_count = config.worker_count();
        Self {
            worker_count,
            channel_capacity: config.effective_channel_capacity(worker_count),
            poll_interval: config.poll_interval,
        }
    }
}

pub struct WorkerPool;

/// 运行中的 worker 池
pub struct WorkerPoolHandle {
    shutdown_tx: watch::Sender<bool>,
    poller: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// 启动轮询任务与 worker（需在 tokio 运行时内调用）
    pub fn start(
        service: Arc<EvaluationService>,
        queue_repo: EvaluationQueueRepository,
        settings: WorkerPoolSettings,
    ) -> WorkerPoolHandle {
        let worker_count = settings.worker_count.max(1);
        let capacity = settings.channel_capacity.max(1);
        let (job_tx, job_rx) = mpsc::channel::<QueueEntry>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(PoolCounters::default());

        tracing::info!(
            "启动求解 worker 池: workers={}, channel_capacity={}, poll_interval_ms={}",
            worker_count,
            capacity,
            settings.poll_interval.as_millis()
        );

        let poller = tokio::spawn(poll_queue(
            Arc::new(queue_repo),
            job_tx,
            shutdown_rx,
            settings.poll_interval,
            counters.clone(),
        ));

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    job_rx.clone(),
                    service.clone(),
                    counters.clone(),
                ))
            })
            .collect();

        WorkerPoolHandle {
            shutdown_tx,
            poller,
            workers,
            counters,
        }
    }
}

impl WorkerPoolHandle {
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            claimed: self.counters.claimed.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// 停止认领新任务,等待已认领任务处理完毕
    pub async fn shutdown(self) -> WorkerPoolStats {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.poller.await {
            tracing::error!("轮询任务异常退出: {}", e);
        }
        // 轮询任务退出时发送端被丢弃,worker 取空通道后自然结束
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                tracing::error!("worker 异常退出: {}", e);
            }
        }
        let stats = WorkerPoolStats {
            claimed: self.counters.claimed.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        };
        tracing::info!(
            "求解 worker 池已停止: claimed={}, completed={}, failed={}",
            stats.claimed,
            stats.completed,
            stats.failed
        );
        stats
    }
}

// ==========================================
// 轮询
// ==========================================

async fn poll_queue(
    queue_repo: Arc<EvaluationQueueRepository>,
    job_tx: mpsc::Sender<QueueEntry>,
    mut shutdown_rx: watch::Receiver<bool>,
    poll_interval: Duration,
    counters: Arc<PoolCounters>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // 通道已满时先等空位,避免认领后无人处理
        let permit = tokio::select! {
            permit = job_tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown_rx.changed() => break,
        };

        let repo = queue_repo.clone();
        let claimed = tokio::task::spawn_blocking(move || repo.claim_next_job()).await;

        match claimed {
            Ok(Ok(Some(job))) => {
                counters.claimed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("认领任务: job_id={}, priority={}", job.job_id, job.priority);
                permit.send(job);
            }
            Ok(Ok(None)) => {
                drop(permit);
                if sleep_or_shutdown(poll_interval, &mut shutdown_rx).await {
                    break;
                }
            }
            Ok(Err(e)) => {
                drop(permit);
                tracing::warn!("认领任务失败,稍后重试: {}", e);
                if sleep_or_shutdown(poll_interval, &mut shutdown_rx).await {
                    break;
                }
            }
            Err(e) => {
                drop(permit);
                tracing::error!("认领任务线程异常: {}", e);
                if sleep_or_shutdown(poll_interval, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }
    tracing::debug!("轮询任务退出");
}

/// 休眠;收到关闭信号时返回 true
async fn sleep_or_shutdown(interval: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => *shutdown_rx.borrow(),
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}

// ==========================================
// worker
// ==========================================

async fn run_worker(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<QueueEntry>>>,
    service: Arc<EvaluationService>,
    counters: Arc<PoolCounters>,
) {
    loop {
        let next = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        let Some(job) = next else {
            break;
        };

        let job_id = job.job_id.clone();
        let svc = service.clone();
        let outcome = tokio::task::spawn_blocking(move || svc.process_job(&job)).await;

        match outcome {
            Ok(Ok(JobOutcome::Failed { error_message })) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "worker {} 任务失败: job_id={}, error={}",
                    worker_id,
                    job_id,
                    error_message
                );
            }
            Ok(Ok(_)) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                // 连失败状态都写不回去,任务停留在 PROCESSING
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("worker {} 无法记录任务结果: job_id={}, error={}", worker_id, job_id, e);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("worker {} 求解线程异常: job_id={}, error={}", worker_id, job_id, e);
            }
        }
    }
    tracing::debug!("worker {} 退出", worker_id);
}
