// ==========================================
// 武器改装最优配置求解 - 数据提供方
// ==========================================
// 职责: 求解核心唯一依赖的只读目录接口
// 并发: 内部缓存允许多 worker 并发读取,首次未命中时在互斥锁后惰性填充
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::SharedConnection;
use crate::domain::catalog::{
    AllowedItemRecord, AttachmentProperties, SlotRecord, TraderOffer, WeaponRecord,
};
use crate::domain::types::Trader;
use crate::repository::error::{column_parse_error, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

// ==========================================
// DataProvider - 数据提供方接口
// ==========================================
pub trait DataProvider: Send + Sync {
    /// 查询武器本体（不存在时返回 NotFound）
    fn get_weapon(&self, id: &str) -> RepositoryResult<WeaponRecord>;

    /// 查询物品的槽位列表（按目录顺序）
    fn get_slots(&self, item_id: &str) -> RepositoryResult<Vec<SlotRecord>>;

    /// 查询槽位允许安装的物品（按目录顺序）
    fn get_allowed_items(&self, slot_id: &str) -> RepositoryResult<Vec<AllowedItemRecord>>;

    /// 查询配件属性与声明的冲突列表
    fn get_attachment_properties(&self, item_id: &str) -> RepositoryResult<AttachmentProperties>;

    /// 查询物品的商人报价
    fn get_trader_offers(&self, item_id: &str) -> RepositoryResult<Vec<TraderOffer>>;
}

/// 惰性填充的只读缓存
struct LazyCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LazyCache<K, V> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, HashMap<K, V>>> {
        self.entries
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 命中直接返回;未命中时调用 load 并写回（load 期间不持有缓存锁）
    fn get_or_load(
        &self,
        key: &K,
        load: impl FnOnce() -> RepositoryResult<V>,
    ) -> RepositoryResult<V> {
        if let Some(v) = self.lock()?.get(key) {
            return Ok(v.clone());
        }
        let value = load()?;
        self.lock()?.insert(key.clone(), value.clone());
        Ok(value)
    }

    fn clear(&self) -> RepositoryResult<()> {
        self.lock()?.clear();
        Ok(())
    }
}

// ==========================================
// SqliteDataProvider - 基于目录表的数据提供方
// ==========================================
pub struct SqliteDataProvider {
    conn: SharedConnection,
    slots: LazyCache<String, Vec<SlotRecord>>,
    allowed_items: LazyCache<String, Vec<AllowedItemRecord>>,
    properties: LazyCache<String, AttachmentProperties>,
    offers: LazyCache<String, Vec<TraderOffer>>,
}

impl SqliteDataProvider {
    /// 从已有连接创建
    pub fn from_connection(conn: SharedConnection) -> Self {
        Self {
            conn,
            slots: LazyCache::new(),
            allowed_items: LazyCache::new(),
            properties: LazyCache::new(),
            offers: LazyCache::new(),
        }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 清空全部惰性缓存（目录重新导入后调用）
    pub fn clear_caches(&self) -> RepositoryResult<()> {
        self.slots.clear()?;
        self.allowed_items.clear()?;
        self.properties.clear()?;
        self.offers.clear()?;
        tracing::info!("数据提供方缓存已清空");
        Ok(())
    }

    fn load_slots(&self, item_id: &str) -> RepositoryResult<Vec<SlotRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT slot_id, name
            FROM item_slot
            WHERE item_id = ?1
            ORDER BY position, slot_id
            "#,
        )?;
        let slots = stmt
            .query_map(params![item_id], |row| {
                Ok(SlotRecord {
                    slot_id: row.get(0)?,
                    slot_name: row.get(1)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(slots)
    }

    fn load_allowed_items(&self, slot_id: &str) -> RepositoryResult<Vec<AllowedItemRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT a.item_id, i.name
            FROM slot_allowed_item a
            JOIN item i ON i.item_id = a.item_id
            WHERE a.slot_id = ?1
            ORDER BY a.position, a.item_id
            "#,
        )?;
        let items = stmt
            .query_map(params![slot_id], |row| {
                Ok(AllowedItemRecord {
                    item_id: row.get(0)?,
                    item_name: row.get(1)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    fn load_properties(&self, item_id: &str) -> RepositoryResult<AttachmentProperties> {
        let conn = self.get_conn()?;
        let modifiers: Option<(i64, i64)> = conn
            .query_row(
                "SELECT recoil_modifier, ergonomics_modifier FROM item WHERE item_id = ?1",
                params![item_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (recoil_modifier, ergonomics_modifier) =
            modifiers.ok_or_else(|| RepositoryError::not_found("item", item_id))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT conflicting_item_id
            FROM item_conflict
            WHERE item_id = ?1
            ORDER BY conflicting_item_id
            "#,
        )?;
        let conflicting_item_ids = stmt
            .query_map(params![item_id], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(AttachmentProperties {
            recoil_modifier,
            ergonomics_modifier,
            conflicting_item_ids,
        })
    }

    fn load_offers(&self, item_id: &str) -> RepositoryResult<Vec<TraderOffer>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT trader, min_level, price
            FROM trader_offer
            WHERE item_id = ?1
            ORDER BY trader, min_level
            "#,
        )?;
        let offers = stmt
            .query_map(params![item_id], |row| {
                let trader_str: String = row.get(0)?;
                let trader = trader_str
                    .parse::<Trader>()
                    .map_err(|e| column_parse_error(0, e))?;
                Ok(TraderOffer {
                    trader,
                    min_level: row.get(1)?,
                    price: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(offers)
    }
}

impl DataProvider for SqliteDataProvider {
    fn get_weapon(&self, id: &str) -> RepositoryResult<WeaponRecord> {
        let conn = self.get_conn()?;
        let weapon = conn
            .query_row(
                r#"
                SELECT item_id, name, recoil_modifier, ergonomics_modifier
                FROM item
                WHERE item_id = ?1 AND kind = 'weapon'
                "#,
                params![id],
                |row| {
                    Ok(WeaponRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        recoil_modifier: row.get(2)?,
                        ergonomics_modifier: row.get(3)?,
                    })
                },
            )
            .optional()?;

        weapon.ok_or_else(|| RepositoryError::not_found("weapon", id))
    }

    fn get_slots(&self, item_id: &str) -> RepositoryResult<Vec<SlotRecord>> {
        self.slots
            .get_or_load(&item_id.to_string(), || self.load_slots(item_id))
    }

    fn get_allowed_items(&self, slot_id: &str) -> RepositoryResult<Vec<AllowedItemRecord>> {
        self.allowed_items
            .get_or_load(&slot_id.to_string(), || self.load_allowed_items(slot_id))
    }

    fn get_attachment_properties(&self, item_id: &str) -> RepositoryResult<AttachmentProperties> {
        self.properties
            .get_or_load(&item_id.to_string(), || self.load_properties(item_id))
    }

    fn get_trader_offers(&self, item_id: &str) -> RepositoryResult<Vec<TraderOffer>> {
        self.offers
            .get_or_load(&item_id.to_string(), || self.load_offers(item_id))
    }
}
