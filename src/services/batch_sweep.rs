// ==========================================
// 武器改装最优配置求解 - 批量扫描入队
// ==========================================
// 为 (武器 × 求解属性 × 商人等级组合) 的每个组合入队一个求解任务
// 武器列表缺省时取目录中全部武器
// ==========================================

use crate::db::SharedConnection;
use crate::domain::constraints::{EvaluationConstraints, TraderLevels};
use crate::domain::types::BuildType;
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::queue_repo::EvaluationQueueRepository;

pub struct BatchSweep {
    catalog_repo: CatalogRepository,
    queue_repo: EvaluationQueueRepository,
}

impl BatchSweep {
    pub fn from_connection(conn: SharedConnection) -> Self {
        Self {
            catalog_repo: CatalogRepository::from_connection(conn.clone()),
            queue_repo: EvaluationQueueRepository::from_connection(conn),
        }
    }

    /// 批量入队
    ///
    /// # 参数
    /// - weapon_ids: 指定武器;None 表示目录中全部武器
    /// - build_types: 求解属性列表
    /// - trader_profiles: 商人等级组合列表
    /// - priority: 全部任务使用同一优先级
    ///
    /// # 返回
    /// 新建任务 ID（按 武器 → 求解属性 → 商人组合 的顺序）
    pub fn enqueue_all(
        &self,
        weapon_ids: Option<&[String]>,
        build_types: &[BuildType],
        trader_profiles: &[TraderLevels],
        priority: i64,
    ) -> RepositoryResult<Vec<String>> {
        for profile in trader_profiles {
            EvaluationConstraints::new(profile.clone())
                .validate()
                .map_err(RepositoryError::ValidationError)?;
        }

        let weapon_ids = match weapon_ids {
            Some(ids) => ids.to_vec(),
            None => self.catalog_repo.list_weapon_ids()?,
        };

        let mut job_ids =
            Vec::with_capacity(weapon_ids.len() * build_types.len() * trader_profiles.len());
        for weapon_id in &weapon_ids {
            for build_type in build_types {
                for profile in trader_profiles {
                    let constraints = EvaluationConstraints::new(profile.clone());
                    job_ids.push(self.queue_repo.enqueue(
                        weapon_id,
                        *build_type,
                        &constraints,
                        priority,
                    )?);
                }
            }
        }

        tracing::info!(
            "批量扫描入队完成: weapons={}, build_types={}, trader_profiles={}, jobs={}",
            weapon_ids.len(),
            build_types.len(),
            trader_profiles.len(),
            job_ids.len()
        );
        Ok(job_ids)
    }
}
