// ==========================================
// 武器改装最优配置求解 - 目录数据记录
// ==========================================
// 职责: 数据提供方边界上交换的只读记录
// ==========================================

use crate::domain::types::{ItemKind, Trader};
use serde::{Deserialize, Serialize};

/// 目录物品（武器或配件）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub recoil_modifier: i64,
    pub ergonomics_modifier: i64,
}

impl CatalogItem {
    pub fn weapon(id: &str, name: &str, recoil_modifier: i64, ergonomics_modifier: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::Weapon,
            recoil_modifier,
            ergonomics_modifier,
        }
    }

    pub fn weapon_mod(id: &str, name: &str, recoil_modifier: i64, ergonomics_modifier: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::WeaponMod,
            recoil_modifier,
            ergonomics_modifier,
        }
    }
}

/// GetWeapon 返回值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponRecord {
    pub id: String,
    pub name: String,
    pub recoil_modifier: i64,
    pub ergonomics_modifier: i64,
}

/// GetSlots 返回的单个槽位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRecord {
    pub slot_id: String,
    pub slot_name: String,
}

/// GetAllowedItems 返回的单个候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedItemRecord {
    pub item_id: String,
    pub item_name: String,
}

/// GetAttachmentProperties 返回值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentProperties {
    pub recoil_modifier: i64,
    pub ergonomics_modifier: i64,
    /// 源数据声明的冲突物品（可能是单向的）
    pub conflicting_item_ids: Vec<String>,
}

/// 商人报价
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderOffer {
    pub trader: Trader,
    /// 购买所需最低商人等级
    pub min_level: u8,
    pub price: i64,
}
