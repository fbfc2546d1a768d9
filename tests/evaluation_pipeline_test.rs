// ==========================================
// 求解流水线集成测试
// ==========================================
// 职责: 验证 入队 → 认领 → 求解 → 缓存 → 幂等 的串联行为（同步调用,不经 worker 池）
// ==========================================


#[cfg(test)]
mod evaluation_pipeline_test {
    use std::sync::Arc;
    use weapon_build_optimizer::cache::{ConflictFreeCache, SqliteConflictFreeCache};
    use weapon_build_optimizer::config::{
        config_keys, ConfigManager, OptimizerConfig, DEFAULT_DATA_VERSION,
    };
    use weapon_build_optimizer::db::SharedConnection;
    use weapon_build_optimizer::domain::CatalogItem;
    use weapon_build_optimizer::repository::{
        CatalogRepository, EvaluationQueueRepository, OptimalBuildRepository,
        SubtreeCacheRepository,
    };
    use weapon_build_optimizer::services::{BatchSweep, EvaluationService, JobOutcome};
    use weapon_build_optimizer::{
        create_cache, BuildType, CacheBackend, EvaluationConstraints, JobStatus, Trader,
        TraderLevels,
    };

    use crate::test_helpers::{create_test_db, seed_two_weapon_catalog, CatalogBuilder};

    fn constraints() -> EvaluationConstraints {
        EvaluationConstraints::new(TraderLevels::uniform(4))
    }

    /// 依次认领并处理队列中的全部任务,返回处理结果（按认领顺序）
    fn drain(
        queue: &EvaluationQueueRepository,
        service: &EvaluationService,
    ) -> Vec<(String, JobOutcome)> {
        let mut outcomes = Vec::new();
        while let Some(job) = queue.claim_next_job().unwrap() {
            let outcome = service.process_job(&job).unwrap();
            outcomes.push((job.item_id.clone(), outcome));
        }
        outcomes
    }

    #[test]
    fn test_priority_order_high_first() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        CatalogBuilder::new(&conn).weapon("svd", -5, 10);

        let queue = EvaluationQueueRepository::from_connection(conn.clone());
        queue.enqueue("svd", BuildType::Recoil, &constraints(), 10).unwrap();
        queue.enqueue("m4", BuildType::Recoil, &constraints(), 100).unwrap();
        queue.enqueue("ak", BuildType::Recoil, &constraints(), 50).unwrap();

        let cache = Arc::new(SqliteConflictFreeCache::from_connection(conn.clone()));
        let service = EvaluationService::from_connection(conn.clone(), cache);
        let order: Vec<String> = drain(&queue, &service)
            .into_iter()
            .map(|(item_id, _)| item_id)
            .collect();
        assert_eq!(order, vec!["m4", "ak", "svd"]);
    }

    #[test]
    fn test_requeue_returns_existing_build() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        let queue = EvaluationQueueRepository::from_connection(conn.clone());
        let cache = Arc::new(SqliteConflictFreeCache::from_connection(conn.clone()));
        let service = EvaluationService::from_connection(conn.clone(), cache);

        queue.enqueue("ak", BuildType::Recoil, &constraints(), 0).unwrap();
        let first = drain(&queue, &service);
        let JobOutcome::Completed { build_id, .. } = &first[0].1 else {
            panic!("unexpected outcome: {:?}", first[0].1);
        };

        let second_job = queue.enqueue("ak", BuildType::Recoil, &constraints(), 0).unwrap();
        let second = drain(&queue, &service);
        assert_eq!(
            second[0].1,
            JobOutcome::AlreadyCompleted {
                build_id: build_id.clone()
            }
        );
        assert_eq!(
            queue.get_job(&second_job).unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn test_conflict_free_cache_shared_across_weapons() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        let queue = EvaluationQueueRepository::from_connection(conn.clone());
        let cache = Arc::new(SqliteConflictFreeCache::from_connection(conn.clone()));
        let service = EvaluationService::from_connection(conn.clone(), cache.clone());

        queue.enqueue("ak", BuildType::Recoil, &constraints(), 10).unwrap();
        queue.enqueue("m4", BuildType::Recoil, &constraints(), 1).unwrap();
        let outcomes = drain(&queue, &service);
        assert_eq!(outcomes.len(), 2);

        // ak 求解时写入 stock 与 pad,m4 直接命中 stock
        let stats = cache.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 1);

        let entry = cache
            .get("stock", BuildType::Recoil, &constraints())
            .unwrap()
            .unwrap();
        assert_eq!(entry.recoil_sum, -5);

        let m4 = OptimalBuildRepository::from_connection(conn)
            .get_completed("m4", BuildType::Recoil, &constraints(), DEFAULT_DATA_VERSION)
            .unwrap()
            .unwrap()
            .result
            .unwrap();
        assert_eq!(m4.recoil_sum, -25);
        assert_eq!(m4.chosen_item_ids(), vec!["stock", "pad"]);
    }

    #[test]
    fn test_non_default_profile_bypasses_cache() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        let cache = Arc::new(SqliteConflictFreeCache::from_connection(conn.clone()));
        let service = EvaluationService::from_connection(conn.clone(), cache.clone());

        let constraints = EvaluationConstraints::new(TraderLevels::uniform(4)).exclude_item("brake");
        let (result, stats) = service
            .evaluate("ak", BuildType::Recoil, &constraints)
            .unwrap();
        // brake 被强制排除,只能用 comp
        assert_eq!(result.recoil_sum, -16);
        assert_eq!(stats.cache_hits + stats.cache_misses, 0);
        assert_eq!(cache.stats().writes, 0);
    }

    #[test]
    fn test_trader_levels_limit_choices() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        let cache = Arc::new(SqliteConflictFreeCache::from_connection(conn.clone()));
        let service = EvaluationService::from_connection(conn.clone(), cache);

        // 机械师 0 级: 所有配件不可购
        let constraints = EvaluationConstraints::new(TraderLevels::new().with(Trader::Prapor, 4));
        let (result, _) = service
            .evaluate("ak", BuildType::Recoil, &constraints)
            .unwrap();
        assert_eq!(result.recoil_sum, -10);
        assert!(result.chosen_item_ids().is_empty());
        assert_eq!(result.selections.len(), 2);
    }

    #[test]
    fn test_data_version_from_config_gates_subtree_cache() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        let manager = ConfigManager::from_connection(conn.clone()).unwrap();
        manager
            .set_global_config_value(config_keys::CATALOG_DATA_VERSION, "2026.10")
            .unwrap();
        let config = OptimizerConfig::load(&manager).unwrap();
        let cache = create_cache(config.cache_backend, conn.clone(), &config.data_version);
        let service = EvaluationService::from_config(conn.clone(), cache, &config);

        let queue = EvaluationQueueRepository::from_connection(conn.clone());
        queue.enqueue("m4", BuildType::Recoil, &constraints(), 0).unwrap();
        drain(&queue, &service);

        let subtree = SubtreeCacheRepository::from_connection(conn.clone());
        assert!(subtree
            .get("m4", BuildType::Recoil, &constraints(), "2026.10", config.max_tree_depth)
            .unwrap()
            .is_some());
        assert!(subtree
            .get("m4", BuildType::Recoil, &constraints(), "0", config.max_tree_depth)
            .unwrap()
            .is_none());

        assert_eq!(subtree.purge_other_versions("2026.11").unwrap(), 1);
    }

    /// 按数据版本创建缓存与服务（与 main 的装配方式一致）
    fn versioned_service(
        conn: &SharedConnection,
        data_version: &str,
    ) -> EvaluationService {
        let cache = create_cache(CacheBackend::Sqlite, conn.clone(), data_version);
        EvaluationService::from_connection(conn.clone(), cache).with_data_version(data_version)
    }

    /// 目录重新导入: pad 后坐力 -3 → -8
    fn reimport_pad(conn: &SharedConnection) {
        CatalogRepository::from_connection(conn.clone())
            .upsert_item(&CatalogItem::weapon_mod("pad", "pad", -8, 0))
            .unwrap();
    }

    #[test]
    fn test_reimported_catalog_not_served_from_old_conflict_free_cache() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);

        let v1 = versioned_service(&conn, "v1");
        let (ak, _) = v1.evaluate("ak", BuildType::Recoil, &constraints()).unwrap();
        assert_eq!(ak.recoil_sum, -19);

        reimport_pad(&conn);

        // 新数据版本: stock 子树必须重新计算,-20 + stock(-2) + pad(-8)
        let v2 = versioned_service(&conn, "v2");
        let (m4, stats) = v2.evaluate("m4", BuildType::Recoil, &constraints()).unwrap();
        assert_eq!(m4.recoil_sum, -30);
        assert_eq!(stats.cache_hits, 0);

        // 同一版本内仍然复用
        let (ak, stats) = v2.evaluate("ak", BuildType::Recoil, &constraints()).unwrap();
        assert_eq!(ak.recoil_sum, -24);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn test_new_data_version_recomputes_completed_build() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        let queue = EvaluationQueueRepository::from_connection(conn.clone());

        queue.enqueue("m4", BuildType::Recoil, &constraints(), 0).unwrap();
        let first = drain(&queue, &versioned_service(&conn, "v1"));
        let JobOutcome::Completed { build_id: v1_build, recoil_sum, .. } = &first[0].1 else {
            panic!("unexpected outcome: {:?}", first[0].1);
        };
        assert_eq!(*recoil_sum, -25);

        reimport_pad(&conn);

        queue.enqueue("m4", BuildType::Recoil, &constraints(), 0).unwrap();
        let second = drain(&queue, &versioned_service(&conn, "v2"));
        let JobOutcome::Completed { build_id: v2_build, recoil_sum, .. } = &second[0].1 else {
            panic!("unexpected outcome: {:?}", second[0].1);
        };
        assert_ne!(v1_build, v2_build);
        assert_eq!(*recoil_sum, -30);

        let builds = OptimalBuildRepository::from_connection(conn);
        let old = builds
            .get_completed("m4", BuildType::Recoil, &constraints(), "v1")
            .unwrap()
            .unwrap();
        assert_eq!(old.result.unwrap().recoil_sum, -25);
        let new = builds
            .get_completed("m4", BuildType::Recoil, &constraints(), "v2")
            .unwrap()
            .unwrap();
        assert_eq!(new.data_version, "v2");
        assert_eq!(new.result.unwrap().recoil_sum, -30);
    }

    #[test]
    fn test_batch_sweep_then_drain() {
        let (_tmp, conn) = create_test_db().unwrap();
        seed_two_weapon_catalog(&conn);
        let job_ids = BatchSweep::from_connection(conn.clone())
            .enqueue_all(
                None,
                &[BuildType::Recoil, BuildType::Ergonomics],
                &[TraderLevels::uniform(4)],
                0,
            )
            .unwrap();
        assert_eq!(job_ids.len(), 4);

        let queue = EvaluationQueueRepository::from_connection(conn.clone());
        let cache = Arc::new(SqliteConflictFreeCache::from_connection(conn.clone()));
        let service = EvaluationService::from_connection(conn, cache);
        let outcomes = drain(&queue, &service);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes
            .iter()
            .all(|(_, o)| matches!(o, JobOutcome::Completed { .. })));

        let stats = queue.queue_stats().unwrap();
        assert_eq!(stats.completed_count, 4);
        assert_eq!(stats.queued_count, 0);
    }
}
