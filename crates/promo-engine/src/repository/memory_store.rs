//! 内存表与唯一索引
//!
//! 基于 DashMap 的并发内存存储。单 key 上的条件更新依赖 DashMap 分片锁，
//! 跨实体的原子单元由上层仓储的事务锁保证。

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// 以字符串 ID 为主键的内存表
#[derive(Debug)]
pub struct MemoryTable<T> {
    rows: Arc<DashMap<String, T>>,
}

impl<T: Clone> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for MemoryTable<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<T: Clone> MemoryTable<T> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
        }
    }

    /// 插入新行，主键已存在时返回 false 且不覆盖
    pub fn insert_new(&self, id: &str, row: T) -> bool {
        match self.rows.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(row);
                true
            }
        }
    }

    /// 获取行的克隆，不持有锁
    pub fn get(&self, id: &str) -> Option<T> {
        self.rows.get(id).map(|row| row.clone())
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        self.rows.remove(id).map(|(_, row)| row)
    }

    /// 在行锁内修改并返回修改后的克隆
    pub fn update<F>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        self.rows.get_mut(id).map(|mut row| {
            f(&mut row);
            row.clone()
        })
    }

    /// 条件更新（CAS）
    ///
    /// 行不存在返回 `None`；条件不满足返回 `Some(Err(当前值))`；
    /// 否则在同一把行锁内执行修改并返回 `Some(Ok(新值))`。
    pub fn update_if<P, F>(&self, id: &str, predicate: P, f: F) -> Option<Result<T, T>>
    where
        P: FnOnce(&T) -> bool,
        F: FnOnce(&mut T),
    {
        self.rows.get_mut(id).map(|mut row| {
            if predicate(&row) {
                f(&mut row);
                Ok(row.clone())
            } else {
                Err(row.clone())
            }
        })
    }

    pub fn list_by<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.rows
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn count_by<F>(&self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        self.rows.iter().filter(|entry| predicate(entry.value())).count()
    }
}

/// 唯一索引：业务键 -> 行 ID
#[derive(Debug, Default, Clone)]
pub struct UniqueIndex {
    keys: Arc<DashMap<String, String>>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 占用业务键
    ///
    /// 键已被占用时返回 `Err(已占用的行 ID)`
    pub fn claim(&self, key: &str, id: &str) -> Result<(), String> {
        match self.keys.entry(key.to_string()) {
            Entry::Occupied(existing) => Err(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(id.to_string());
                Ok(())
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Option<String> {
        self.keys.get(key).map(|id| id.clone())
    }

    /// 释放业务键（仅当仍指向给定行时）
    pub fn release(&self, key: &str, id: &str) {
        self.keys.remove_if(key, |_, owner| owner == id);
    }
}
