// ==========================================
// 武器改装最优配置求解 - 目录数据仓储
// ==========================================
// 职责: 目录表写入（供外部导入器与测试使用）+ 武器列表
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::SharedConnection;
use crate::domain::catalog::{CatalogItem, TraderOffer};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::MutexGuard;

// ==========================================
// CatalogRepository - 目录仓储
// ==========================================
pub struct CatalogRepository {
    conn: SharedConnection,
}

impl CatalogRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入或更新物品
    pub fn upsert_item(&self, item: &CatalogItem) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO item (item_id, name, kind, recoil_modifier, ergonomics_modifier)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(item_id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                recoil_modifier = excluded.recoil_modifier,
                ergonomics_modifier = excluded.ergonomics_modifier
            "#,
            params![
                item.id,
                item.name,
                item.kind.as_str(),
                item.recoil_modifier,
                item.ergonomics_modifier,
            ],
        )?;
        Ok(())
    }

    /// 插入或更新槽位
    pub fn upsert_slot(
        &self,
        item_id: &str,
        slot_id: &str,
        slot_name: &str,
        position: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO item_slot (slot_id, item_id, name, position)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(slot_id) DO UPDATE SET
                item_id = excluded.item_id,
                name = excluded.name,
                position = excluded.position
            "#,
            params![slot_id, item_id, slot_name, position],
        )?;
        Ok(())
    }

    /// 登记槽位允许的物品
    pub fn add_allowed_item(&self, slot_id: &str, item_id: &str, position: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO slot_allowed_item (slot_id, item_id, position)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(slot_id, item_id) DO UPDATE SET position = excluded.position
            "#,
            params![slot_id, item_id, position],
        )?;
        Ok(())
    }

    /// 登记冲突（按源数据原样保存,可能是单向的）
    pub fn add_conflict(&self, item_id: &str, conflicting_item_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO item_conflict (item_id, conflicting_item_id) VALUES (?1, ?2)",
            params![item_id, conflicting_item_id],
        )?;
        Ok(())
    }

    /// 整体替换物品的商人报价
    pub fn replace_trader_offers(&self, item_id: &str, offers: &[TraderOffer]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM trader_offer WHERE item_id = ?1", params![item_id])?;
        for offer in offers {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO trader_offer (item_id, trader, min_level, price)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![item_id, offer.trader.as_str(), offer.min_level, offer.price],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 列出全部武器 ID（批量扫描生产者使用）
    pub fn list_weapon_ids(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT item_id FROM item WHERE kind = 'weapon' ORDER BY item_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ids)
    }
}
