// ==========================================
// 武器改装最优配置求解 - 领域类型定义
// ==========================================
// 职责: 求解目标属性、物品种类、商人、队列/结果状态
// 序列化格式: 与数据库列值一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 求解目标属性 (Build Type / Focused Stat)
// ==========================================
// 红线: 只有 recoil / ergonomics 两种,未知名称属于配置错误,不重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    Recoil,     // 后坐力: 越小越好
    Ergonomics, // 人机工效: 越大越好
}

impl BuildType {
    pub const ALL: [BuildType; 2] = [BuildType::Recoil, BuildType::Ergonomics];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Recoil => "recoil",
            BuildType::Ergonomics => "ergonomics",
        }
    }

    /// 次要属性（被跟踪但不优化）
    pub fn secondary(&self) -> BuildType {
        match self {
            BuildType::Recoil => BuildType::Ergonomics,
            BuildType::Ergonomics => BuildType::Recoil,
        }
    }

    /// a 是否严格优于 b（按本属性的优化方向）
    pub fn is_better(&self, a: i64, b: i64) -> bool {
        match self {
            BuildType::Recoil => a < b,
            BuildType::Ergonomics => a > b,
        }
    }

    /// 从 (recoil, ergonomics) 二元组中取出本属性的值
    pub fn pick(&self, recoil: i64, ergonomics: i64) -> i64 {
        match self {
            BuildType::Recoil => recoil,
            BuildType::Ergonomics => ergonomics,
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recoil" => Ok(BuildType::Recoil),
            "ergonomics" | "ergo" => Ok(BuildType::Ergonomics),
            other => Err(format!("未知的求解属性: {}", other)),
        }
    }
}

// ==========================================
// 物品种类 (Item Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Weapon,    // 武器本体（树根）
    WeaponMod, // 配件
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Weapon => "weapon",
            ItemKind::WeaponMod => "weapon_mod",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weapon" => Ok(ItemKind::Weapon),
            "weapon_mod" => Ok(ItemKind::WeaponMod),
            other => Err(format!("未知的物品种类: {}", other)),
        }
    }
}

// ==========================================
// 商人 (Trader)
// ==========================================
// 声明顺序即固定序列化顺序（缓存键与插入顺序无关）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Trader {
    Prapor,
    Therapist,
    Fence,
    Skier,
    Peacekeeper,
    Mechanic,
    Ragman,
    Jaeger,
}

impl Trader {
    pub const ALL: [Trader; 8] = [
        Trader::Prapor,
        Trader::Therapist,
        Trader::Fence,
        Trader::Skier,
        Trader::Peacekeeper,
        Trader::Mechanic,
        Trader::Ragman,
        Trader::Jaeger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Trader::Prapor => "Prapor",
            Trader::Therapist => "Therapist",
            Trader::Fence => "Fence",
            Trader::Skier => "Skier",
            Trader::Peacekeeper => "Peacekeeper",
            Trader::Mechanic => "Mechanic",
            Trader::Ragman => "Ragman",
            Trader::Jaeger => "Jaeger",
        }
    }
}

impl fmt::Display for Trader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Trader::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("未知的商人: {}", wanted))
    }
}

// ==========================================
// 队列任务状态 (Job Status)
// ==========================================
// 状态机: Queued → Processing → {Completed | Failed}
// 红线: 终态不可再迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(JobStatus::Queued),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("未知的任务状态: {}", other)),
        }
    }
}

// ==========================================
// 最优配置记录状态 (Build Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildStatus {
    Processing,
    Completed,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Processing => "PROCESSING",
            BuildStatus::Completed => "COMPLETED",
            BuildStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(BuildStatus::Processing),
            "COMPLETED" => Ok(BuildStatus::Completed),
            "FAILED" => Ok(BuildStatus::Failed),
            other => Err(format!("未知的配置状态: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_type_direction() {
        assert!(BuildType::Recoil.is_better(-5, -3));
        assert!(!BuildType::Recoil.is_better(-3, -3));
        assert!(BuildType::Ergonomics.is_better(7, 3));
        assert_eq!(BuildType::Recoil.secondary(), BuildType::Ergonomics);
    }

    #[test]
    fn test_build_type_parse_rejects_unknown() {
        assert_eq!("Recoil".parse::<BuildType>().unwrap(), BuildType::Recoil);
        assert!("accuracy".parse::<BuildType>().is_err());
    }

    #[test]
    fn test_trader_parse_case_insensitive() {
        assert_eq!("mechanic".parse::<Trader>().unwrap(), Trader::Mechanic);
        assert!("Santa".parse::<Trader>().is_err());
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert_eq!("QUEUED".parse::<JobStatus>().unwrap(), JobStatus::Queued);
    }
}
