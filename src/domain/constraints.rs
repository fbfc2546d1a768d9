// ==========================================
// 武器改装最优配置求解 - 求解约束
// ==========================================
// 职责: 商人等级元组 + 忽略槽位 + 强制排除物品
// 红线: 树构建开始后约束不可变
// ==========================================

use crate::domain::catalog::TraderOffer;
use crate::domain::types::Trader;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 商人等级下限
pub const MIN_TRADER_LEVEL: u8 = 1;
/// 商人等级上限
pub const MAX_TRADER_LEVEL: u8 = 5;

// ==========================================
// TraderLevels - 商人等级元组
// ==========================================
// BTreeMap 以 Trader 声明顺序排序,序列化结果与插入顺序无关
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraderLevels(BTreeMap<Trader, u8>);

impl TraderLevels {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// 所有商人取同一等级
    pub fn uniform(level: u8) -> Self {
        Self(Trader::ALL.iter().map(|t| (*t, level)).collect())
    }

    pub fn with(mut self, trader: Trader, level: u8) -> Self {
        self.0.insert(trader, level);
        self
    }

    pub fn set(&mut self, trader: Trader, level: u8) {
        self.0.insert(trader, level);
    }

    pub fn level(&self, trader: Trader) -> Option<u8> {
        self.0.get(&trader).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Trader, u8)> + '_ {
        self.0.iter().map(|(t, l)| (*t, *l))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 校验每个等级都在 1..=5
    pub fn validate(&self) -> Result<(), String> {
        for (trader, level) in self.iter() {
            if !(MIN_TRADER_LEVEL..=MAX_TRADER_LEVEL).contains(&level) {
                return Err(format!(
                    "商人等级越界: {}={} (允许范围 {}..={})",
                    trader, level, MIN_TRADER_LEVEL, MAX_TRADER_LEVEL
                ));
            }
        }
        Ok(())
    }

    /// 是否至少有一个报价满足当前等级
    ///
    /// 没有任何报价的物品视为不可购买
    pub fn can_purchase(&self, offers: &[TraderOffer]) -> bool {
        offers.iter().any(|offer| {
            self.level(offer.trader)
                .map(|level| level >= offer.min_level)
                .unwrap_or(false)
        })
    }

    /// 确定性缓存键: "Prapor=4,Therapist=3,..."
    pub fn cache_key(&self) -> String {
        self.iter()
            .map(|(t, l)| format!("{}={}", t, l))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for TraderLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

// ==========================================
// EvaluationConstraints - 求解约束
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationConstraints {
    /// 商人等级元组
    pub trader_levels: TraderLevels,
    /// 完全忽略的槽位名称（不填充候选）
    #[serde(default)]
    pub ignored_slot_names: BTreeSet<String>,
    /// 强制排除的物品 ID
    #[serde(default)]
    pub excluded_item_ids: BTreeSet<String>,
}

impl EvaluationConstraints {
    pub fn new(trader_levels: TraderLevels) -> Self {
        Self {
            trader_levels,
            ignored_slot_names: BTreeSet::new(),
            excluded_item_ids: BTreeSet::new(),
        }
    }

    pub fn ignore_slot(mut self, slot_name: impl Into<String>) -> Self {
        self.ignored_slot_names.insert(slot_name.into());
        self
    }

    pub fn exclude_item(mut self, item_id: impl Into<String>) -> Self {
        self.excluded_item_ids.insert(item_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.trader_levels.validate()?;
        if self.ignored_slot_names.iter().any(|s| s.trim().is_empty()) {
            return Err("忽略槽位名称不能为空".to_string());
        }
        if self.excluded_item_ids.iter().any(|s| s.trim().is_empty()) {
            return Err("排除物品 ID 不能为空".to_string());
        }
        Ok(())
    }

    /// 没有忽略槽位也没有排除物品（无冲突缓存只在此时可用）
    pub fn is_default_profile(&self) -> bool {
        self.ignored_slot_names.is_empty() && self.excluded_item_ids.is_empty()
    }

    pub fn is_slot_ignored(&self, slot_name: &str) -> bool {
        self.ignored_slot_names.contains(slot_name)
    }

    pub fn is_item_excluded(&self, item_id: &str) -> bool {
        self.excluded_item_ids.contains(item_id)
    }

    /// 完整约束的确定性键（用于最优配置 / 子树缓存的唯一约束）
    pub fn cache_key(&self) -> String {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(",");
        format!(
            "{}|ignore={}|exclude={}",
            self.trader_levels.cache_key(),
            join(&self.ignored_slot_names),
            join(&self.excluded_item_ids)
        )
    }
}
