use super::*;
use crate::cache::MemoryConflictFreeCache;
use crate::domain::constraints::EvaluationConstraints;
use crate::engine::test_fixture::{default_constraints, recoil_example, CatalogFixture};
use crate::engine::tree_builder::CandidateTreeBuilder;

// ==========================================
// 测试辅助函数
// ==========================================

fn build(
    fx: &CatalogFixture,
    weapon_id: &str,
    stat: BuildType,
    constraints: &EvaluationConstraints,
) -> CandidateTree {
    let provider = fx.provider();
    CandidateTreeBuilder::new(&provider)
        .build(weapon_id, stat, constraints)
        .unwrap()
}

fn run(tree: &CandidateTree, stat: BuildType) -> SearchOutcome {
    search(tree, stat, &BTreeSet::new(), None).unwrap()
}

fn chosen(result: &BuildResult) -> Vec<String> {
    let mut ids: Vec<String> = result
        .chosen_item_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    ids.sort();
    ids
}

/// 两把武器共用配件 x（x 自带子槽位 y）
fn shared_attachment_catalog() -> CatalogFixture {
    let fx = CatalogFixture::new();
    fx.weapon("w1", -10, 20)
        .weapon("w2", -20, 10)
        .attachment("x", -2, 1)
        .attachment("y", -3, 0)
        .slot("w1", "w1_stock", "mod_stock", &["x"])
        .slot("w2", "w2_stock", "mod_stock", &["x"])
        .slot("x", "x_pad", "mod_pad", &["y"]);
    fx
}

// ==========================================
// 最优性
// ==========================================

#[test]
fn test_recoil_example_totals_minus_18() {
    let fx = recoil_example();
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    assert_eq!(outcome.result.recoil_sum, -18);
    assert_eq!(outcome.result.focused_sum(), -18);
    assert_eq!(chosen(&outcome.result), vec!["a", "c", "d"]);
    // 每个被决策的槽位都有一条记录
    assert_eq!(outcome.result.selections.len(), 3);
    let stock = &outcome.result.selections[0];
    assert_eq!(stock.slot_id, "w_stock");
    assert_eq!(stock.parent_item_id, "w");
    assert_eq!(stock.item_id.as_deref(), Some("a"));
}

#[test]
fn test_conflicting_pair_never_both_chosen() {
    let fx = CatalogFixture::new();
    fx.weapon("w", 0, 0)
        .attachment("A", -5, 0)
        .attachment("B", -5, 0)
        .slot("w", "s1", "mod_stock", &["A"])
        .slot("w", "s2", "mod_muzzle", &["B"])
        .conflict("A", "B");
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    let ids = chosen(&outcome.result);
    assert_eq!(ids.len(), 1);
    assert_eq!(outcome.result.recoil_sum, -5);
}

#[test]
fn test_conflict_declared_on_other_side_is_respected() {
    let fx = CatalogFixture::new();
    fx.weapon("w", 0, 0)
        .attachment("A", -5, 0)
        .attachment("B", -4, 0)
        .slot("w", "s1", "mod_stock", &["A"])
        .slot("w", "s2", "mod_muzzle", &["B"])
        .conflict("B", "A");
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    assert_eq!(chosen(&outcome.result), vec!["A"]);
    assert_eq!(outcome.result.recoil_sum, -5);
}

#[test]
fn test_non_clique_conflicts_find_true_optimum() {
    // A–B、B–C 冲突,A–C 不冲突: A + C(-6) 优于单独的 B(-5)
    let fx = CatalogFixture::new();
    fx.weapon("w", 0, 0)
        .attachment("A", -3, 0)
        .attachment("B", -5, 0)
        .attachment("C", -3, 0)
        .slot("w", "s1", "mod_stock", &["A"])
        .slot("w", "s2", "mod_muzzle", &["B"])
        .slot("w", "s3", "mod_scope", &["C"])
        .conflict("A", "B")
        .conflict("B", "C");
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    assert_eq!(chosen(&outcome.result), vec!["A", "C"]);
    assert_eq!(outcome.result.recoil_sum, -6);
}

#[test]
fn test_conflicting_rival_uses_memo() {
    let fx = CatalogFixture::new();
    fx.weapon("w", 0, 0)
        .attachment("p", -5, 5)
        .attachment("r", -2, 0)
        .attachment("q", -1, 0)
        .slot("w", "w_stock", "mod_stock", &["p", "r"])
        .slot("w", "w_muzzle", "mod_muzzle", &["q"])
        .conflict("p", "q");
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    assert_eq!(chosen(&outcome.result), vec!["p"]);
    assert_eq!(outcome.result.recoil_sum, -5);
    assert_eq!(outcome.result.ergonomics_sum, 5);
    // 留空与选 r 之后剩下的子问题相同
    assert!(outcome.stats.memo_hits >= 1);
}

#[test]
fn test_interner_reuses_ids_for_equal_keys() {
    let mut sets: Interner<BTreeSet<String>> = Interner::new();
    let a: BTreeSet<String> = ["x".to_string(), "y".to_string()].into_iter().collect();
    let same: BTreeSet<String> = ["y".to_string(), "x".to_string()].into_iter().collect();
    let empty = BTreeSet::new();

    assert_eq!(sets.intern(&a), 0);
    assert_eq!(sets.intern(&empty), 1);
    assert_eq!(sets.intern(&same), 0);
    assert_eq!(sets.len(), 2);

    let mut lists: Interner<Vec<SlotIdx>> = Interner::new();
    let first = lists.intern(&[SlotIdx(3), SlotIdx(1)][..]);
    assert_eq!(lists.intern(&vec![SlotIdx(3), SlotIdx(1)][..]), first);
    assert_ne!(lists.intern(&[SlotIdx(1), SlotIdx(3)][..]), first);
    assert_eq!(lists.len(), 2);
}

#[test]
fn test_initial_exclusions_respected() {
    let fx = recoil_example();
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let excluded: BTreeSet<String> = ["d".to_string()].into_iter().collect();
    let outcome = search(&tree, BuildType::Recoil, &excluded, None).unwrap();

    assert_eq!(chosen(&outcome.result), vec!["a", "c"]);
    assert_eq!(outcome.result.recoil_sum, -15);
}

// ==========================================
// 平局规则
// ==========================================

#[test]
fn test_secondary_stat_breaks_focused_tie() {
    let fx = CatalogFixture::new();
    fx.weapon("w", -10, 30)
        .attachment("helps_ergo", 0, 3)
        .attachment("hurts_ergo", 0, -2)
        .slot("w", "s1", "mod_pistol_grip", &["helps_ergo"])
        .slot("w", "s2", "mod_mount", &["hurts_ergo"]);
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    // 后坐力持平: 改善人机的装上,拖累人机的留空
    assert_eq!(chosen(&outcome.result), vec!["helps_ergo"]);
    assert_eq!(outcome.result.recoil_sum, -10);
    assert_eq!(outcome.result.ergonomics_sum, 33);
    assert_eq!(outcome.result.selections[1].item_id, None);
}

#[test]
fn test_ergonomics_search_tracks_recoil_as_secondary() {
    let fx = recoil_example();
    let tree = build(&fx, "w", BuildType::Ergonomics, &default_constraints());
    let outcome = run(&tree, BuildType::Ergonomics);

    // 人机全部为 0,次要属性后坐力决定选择
    assert_eq!(outcome.result.ergonomics_sum, 30);
    assert_eq!(outcome.result.recoil_sum, -18);
}

#[test]
fn test_equal_candidates_keep_incumbent() {
    let fx = CatalogFixture::new();
    fx.weapon("w", 0, 0)
        .attachment("m1", -2, 1)
        .attachment("m2", -2, 1)
        .attachment("blocker", -1, 0)
        .slot("w", "s1", "mod_stock", &["m1", "m2"])
        .slot("w", "s2", "mod_muzzle", &["blocker"])
        .conflict("m1", "blocker")
        .conflict("m2", "blocker");
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    // m1/m2 完全相同,按排序先遇到的 m1 保留
    assert_eq!(chosen(&outcome.result), vec!["m1"]);
}

#[test]
fn test_focused_tie_prefers_sibling_with_better_secondary() {
    // r_a 排序在前,但它的 -5 只能搭配人机 0;t_b 的 -5 搭配人机 10
    let fx = CatalogFixture::new();
    fx.weapon("w", 0, 0)
        .attachment("r_a", 0, 0)
        .attachment("t_b", 0, 0)
        .attachment("ra_rec", -5, 0)
        .attachment("ra_ergo", 0, 10)
        .attachment("tb_both", -5, 10)
        .slot("w", "w_s", "mod_stock", &["r_a", "t_b"])
        .slot("r_a", "ra_s", "mod_pad", &["ra_rec", "ra_ergo"])
        .slot("t_b", "tb_s", "mod_pad", &["tb_both"]);
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let outcome = run(&tree, BuildType::Recoil);

    assert_eq!(outcome.result.recoil_sum, -5);
    assert_eq!(outcome.result.ergonomics_sum, 10);
    assert_eq!(chosen(&outcome.result), vec!["t_b", "tb_both"]);
}

#[test]
fn test_initial_exclusion_of_pruning_rival_rejected() {
    // b 因 a 的子树而被剔除,再在搜索时排除 c 会让剔除失效
    let fx = recoil_example();
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());
    let excluded: BTreeSet<String> = ["c".to_string()].into_iter().collect();
    let err = search(&tree, BuildType::Recoil, &excluded, None).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration(_)));

    // 同样的排除放进约束里重新建树,b 会回到候选中
    let constraints = default_constraints().exclude_item("c");
    let rebuilt = build(&fx, "w", BuildType::Recoil, &constraints);
    let outcome = run(&rebuilt, BuildType::Recoil);
    assert_eq!(outcome.result.recoil_sum, -15);
    assert_eq!(chosen(&outcome.result), vec!["b", "d"]);
}

// ==========================================
// 确定性与错误
// ==========================================

#[test]
fn test_repeated_search_is_identical() {
    let fx = CatalogFixture::new();
    fx.weapon("w", -5, 10)
        .attachment("A", -3, 1)
        .attachment("B", -5, -1)
        .attachment("C", -3, 2)
        .attachment("D", -1, 4)
        .slot("w", "s1", "mod_stock", &["A", "D"])
        .slot("w", "s2", "mod_muzzle", &["B"])
        .slot("w", "s3", "mod_scope", &["C"])
        .slot("A", "a_pad", "mod_pad", &["C"])
        .conflict("A", "B")
        .conflict("B", "C");

    let first = run(
        &build(&fx, "w", BuildType::Recoil, &default_constraints()),
        BuildType::Recoil,
    );
    let second = run(
        &build(&fx, "w", BuildType::Recoil, &default_constraints()),
        BuildType::Recoil,
    );
    assert_eq!(first.result, second.result);
    assert_eq!(
        serde_json::to_string(&first.result).unwrap(),
        serde_json::to_string(&second.result).unwrap()
    );
}

#[test]
fn test_parse_focused_stat() {
    assert_eq!(parse_focused_stat("recoil").unwrap(), BuildType::Recoil);
    assert_eq!(parse_focused_stat("Ergonomics").unwrap(), BuildType::Ergonomics);
    assert!(matches!(
        parse_focused_stat("weight"),
        Err(EngineError::InvalidConfiguration(_))
    ));
}

// ==========================================
// 无冲突缓存
// ==========================================

#[test]
fn test_cache_reused_across_weapons() {
    let fx = shared_attachment_catalog();
    let cache = MemoryConflictFreeCache::new();

    let tree1 = build(&fx, "w1", BuildType::Recoil, &default_constraints());
    let first = search(&tree1, BuildType::Recoil, &BTreeSet::new(), Some(&cache)).unwrap();
    assert_eq!(first.result.recoil_sum, -15);
    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(first.stats.cache_misses, 2);

    let tree2 = build(&fx, "w2", BuildType::Recoil, &default_constraints());
    let second = search(&tree2, BuildType::Recoil, &BTreeSet::new(), Some(&cache)).unwrap();
    assert_eq!(second.stats.cache_hits, 1);
    assert_eq!(second.stats.cache_misses, 0);
    assert_eq!(second.result.recoil_sum, -25);
    assert_eq!(chosen(&second.result), vec!["x", "y"]);
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn test_primed_cache_entry_short_circuits_subtree() {
    let fx = shared_attachment_catalog();
    let cache = MemoryConflictFreeCache::new();
    cache
        .set(
            &default_constraints(),
            &CacheEntry {
                item_id: "x".to_string(),
                build_type: BuildType::Recoil,
                recoil_sum: -40,
                ergonomics_sum: 1,
                selections: Vec::new(),
            },
        )
        .unwrap();

    let tree = build(&fx, "w2", BuildType::Recoil, &default_constraints());
    let outcome = search(&tree, BuildType::Recoil, &BTreeSet::new(), Some(&cache)).unwrap();
    // 使用的是缓存里的总和,而不是重新计算的 -5
    assert_eq!(outcome.result.recoil_sum, -60);
    assert_eq!(outcome.stats.cache_hits, 1);
    assert_eq!(chosen(&outcome.result), vec!["x"]);
}

#[test]
fn test_cached_entry_violating_exclusions_is_recomputed() {
    let fx = shared_attachment_catalog();
    let cache = MemoryConflictFreeCache::new();
    cache
        .set(
            &default_constraints(),
            &CacheEntry {
                item_id: "x".to_string(),
                build_type: BuildType::Recoil,
                recoil_sum: -40,
                ergonomics_sum: 1,
                selections: vec![BuildSelection {
                    parent_item_id: "x".to_string(),
                    slot_id: "x_pad".to_string(),
                    slot_name: "mod_pad".to_string(),
                    item_id: Some("banned".to_string()),
                    item_name: Some("banned".to_string()),
                }],
            },
        )
        .unwrap();

    let tree = build(&fx, "w2", BuildType::Recoil, &default_constraints());
    let excluded: BTreeSet<String> = ["banned".to_string()].into_iter().collect();
    let outcome = search(&tree, BuildType::Recoil, &excluded, Some(&cache)).unwrap();
    assert_eq!(outcome.result.recoil_sum, -25);
    assert_eq!(outcome.stats.cache_hits, 0);
}

#[test]
fn test_cache_bypassed_for_non_default_profile() {
    let fx = shared_attachment_catalog();
    let cache = MemoryConflictFreeCache::new();
    let constraints = default_constraints().ignore_slot("mod_scope");

    let tree = build(&fx, "w1", BuildType::Recoil, &constraints);
    let outcome = search(&tree, BuildType::Recoil, &BTreeSet::new(), Some(&cache)).unwrap();
    assert_eq!(outcome.result.recoil_sum, -15);
    assert_eq!(outcome.stats.cache_misses, 0);
    assert_eq!(cache.stats(), Default::default());
    assert!(cache.is_empty());
}

#[test]
fn test_cached_and_uncached_results_match() {
    let fx = recoil_example();
    let cache = MemoryConflictFreeCache::new();
    let tree = build(&fx, "w", BuildType::Recoil, &default_constraints());

    let plain = run(&tree, BuildType::Recoil);
    let cached = search(&tree, BuildType::Recoil, &BTreeSet::new(), Some(&cache)).unwrap();
    let warm = search(&tree, BuildType::Recoil, &BTreeSet::new(), Some(&cache)).unwrap();
    assert_eq!(plain.result, cached.result);
    assert_eq!(plain.result, warm.result);
    assert!(warm.stats.cache_hits > 0);
}
