// ==========================================
// 引擎层单元测试 - 目录夹具
// ==========================================
// 在内存库中搭建小型武器目录,供候选树与搜索测试复用
// ==========================================

use crate::db::{open_in_memory_shared, SharedConnection};
use crate::domain::catalog::{CatalogItem, TraderOffer};
use crate::domain::constraints::{EvaluationConstraints, TraderLevels};
use crate::domain::types::Trader;
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::data_provider::SqliteDataProvider;
use std::cell::Cell;

pub(crate) struct CatalogFixture {
    pub conn: SharedConnection,
    catalog: CatalogRepository,
    position: Cell<i64>,
}

impl CatalogFixture {
    pub fn new() -> Self {
        let conn = open_in_memory_shared().unwrap();
        let catalog = CatalogRepository::from_connection(conn.clone());
        Self {
            conn,
            catalog,
            position: Cell::new(0),
        }
    }

    fn next_position(&self) -> i64 {
        let p = self.position.get();
        self.position.set(p + 1);
        p
    }

    pub fn weapon(&self, id: &str, recoil: i64, ergonomics: i64) -> &Self {
        self.catalog
            .upsert_item(&CatalogItem::weapon(id, id, recoil, ergonomics))
            .unwrap();
        self
    }

    /// 配件,默认机械师 1 级可购
    pub fn attachment(&self, id: &str, recoil: i64, ergonomics: i64) -> &Self {
        self.attachment_sold_by(id, recoil, ergonomics, Trader::Mechanic, 1)
    }

    pub fn attachment_sold_by(
        &self,
        id: &str,
        recoil: i64,
        ergonomics: i64,
        trader: Trader,
        min_level: u8,
    ) -> &Self {
        self.catalog
            .upsert_item(&CatalogItem::weapon_mod(id, id, recoil, ergonomics))
            .unwrap();
        self.catalog
            .replace_trader_offers(
                id,
                &[TraderOffer {
                    trader,
                    min_level,
                    price: 1000,
                }],
            )
            .unwrap();
        self
    }

    /// 无报价配件
    pub fn unsold_attachment(&self, id: &str, recoil: i64, ergonomics: i64) -> &Self {
        self.catalog
            .upsert_item(&CatalogItem::weapon_mod(id, id, recoil, ergonomics))
            .unwrap();
        self
    }

    pub fn slot(&self, owner_id: &str, slot_id: &str, slot_name: &str, allowed: &[&str]) -> &Self {
        self.catalog
            .upsert_slot(owner_id, slot_id, slot_name, self.next_position())
            .unwrap();
        for item_id in allowed {
            self.catalog
                .add_allowed_item(slot_id, item_id, self.next_position())
                .unwrap();
        }
        self
    }

    /// 单向登记冲突
    pub fn conflict(&self, item_id: &str, other: &str) -> &Self {
        self.catalog.add_conflict(item_id, other).unwrap();
        self
    }

    pub fn provider(&self) -> SqliteDataProvider {
        SqliteDataProvider::from_connection(self.conn.clone())
    }
}

/// 全部商人 4 级
pub(crate) fn default_constraints() -> EvaluationConstraints {
    EvaluationConstraints::new(TraderLevels::uniform(4))
}

/// 武器 -10;
/// mod_stock 槽: a(-1, 子槽 mod_pad: c(-4)) 与 b(-2);
/// mod_muzzle 槽: d(-3)
pub(crate) fn recoil_example() -> CatalogFixture {
    let fx = CatalogFixture::new();
    fx.weapon("w", -10, 30)
        .attachment("a", -1, 0)
        .attachment("b", -2, 0)
        .attachment("c", -4, 0)
        .attachment("d", -3, 0)
        .slot("w", "w_stock", "mod_stock", &["a", "b"])
        .slot("a", "a_pad", "mod_pad", &["c"])
        .slot("w", "w_muzzle", "mod_muzzle", &["d"]);
    fx
}
