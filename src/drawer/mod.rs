//! 新建 / 编辑 / 复制抽屉状态
//!
//! 抽屉每次打开或关闭都会更换代号；详情请求带着打开时的代号返回，
//! 代号不一致（期间关闭或重新打开过）时丢弃，避免填充已隐藏的表单。

mod bookmarks;

pub use bookmarks::{BookmarkState, BookmarkTable};

use tracing::debug;

use crate::error::Result;
use crate::models::validation::ValidationErrors;
use crate::notify::{ErrorBoundary, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawerMode {
    Create,
    Edit(i64),
    Duplicate(i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawerState {
    pub visible: bool,
    pub target_id: Option<i64>,
    pub is_duplicate: bool,
}

/// 一次打开对应的详情加载凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailTicket {
    generation: u64,
    id: Option<i64>,
}

impl DetailTicket {
    /// 需要加载的记录；新建模式为 `None`
    pub fn id(&self) -> Option<i64> {
        self.id
    }
}

/// 提交结果
#[derive(Debug)]
pub enum SubmitOutcome<T> {
    Saved(T),
    /// 422：字段错误已展示，抽屉保持打开
    Invalid,
    Failed(Outcome),
}

pub struct ActionDrawer<F> {
    state: DrawerState,
    generation: u64,
    defaults: F,
    form: F,
    table: BookmarkTable,
    bookmarks: Vec<BookmarkState>,
    active_bookmark: Option<String>,
    field_errors: ValidationErrors,
}

impl<F: Clone + Default> ActionDrawer<F> {
    pub fn new(table: BookmarkTable) -> Self {
        Self::with_defaults(table, F::default())
    }
}

impl<F: Clone> ActionDrawer<F> {
    pub fn with_defaults(table: BookmarkTable, defaults: F) -> Self {
        let bookmarks = table
            .names()
            .map(|name| BookmarkState {
                name: name.to_string(),
                has_error: false,
            })
            .collect();
        let active_bookmark = table.first().map(str::to_string);

        Self {
            state: DrawerState::default(),
            generation: 0,
            form: defaults.clone(),
            defaults,
            table,
            bookmarks,
            active_bookmark,
            field_errors: ValidationErrors::default(),
        }
    }

    /// 打开抽屉：`None` 为新建，`Some(id)` 为编辑，带 `is_duplicate` 为复制
    pub fn open(&mut self, id: Option<i64>, is_duplicate: bool) -> DetailTicket {
        self.generation += 1;
        self.state = DrawerState {
            visible: true,
            target_id: id,
            is_duplicate: id.is_some() && is_duplicate,
        };
        self.clear_errors();
        self.active_bookmark = self.table.first().map(str::to_string);

        if id.is_none() {
            self.form = self.defaults.clone();
        }

        debug!(mode = ?self.mode(), generation = self.generation, "Drawer opened");
        DetailTicket {
            generation: self.generation,
            id,
        }
    }

    /// 写入详情；抽屉已关闭或已重新打开时返回 `false`
    pub fn apply_detail(&mut self, ticket: DetailTicket, values: F) -> bool {
        if !self.state.visible || ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                generation = self.generation,
                "Discarding detail for a closed drawer"
            );
            return false;
        }
        self.form = values;
        true
    }

    pub fn close(&mut self, clear_on_close: bool) {
        self.generation += 1;
        self.state.visible = false;
        if clear_on_close {
            self.form = self.defaults.clone();
            self.clear_errors();
        }
    }

    /// 展示 422 字段错误并切换到出错的书签
    pub fn apply_validation_errors(&mut self, errors: ValidationErrors) {
        let errored: Vec<String> = self
            .table
            .errored(&errors)
            .into_iter()
            .map(str::to_string)
            .collect();

        for bookmark in &mut self.bookmarks {
            bookmark.has_error = errored.contains(&bookmark.name);
        }

        let active_is_clean = self
            .active_bookmark
            .as_ref()
            .map_or(true, |active| !errored.contains(active));
        if active_is_clean {
            if let Some(first) = errored.first() {
                self.active_bookmark = Some(first.clone());
            }
        }

        self.field_errors = errors;
    }

    /// 处理提交结果
    pub fn finish_submit<T>(&mut self, result: Result<T>, boundary: &ErrorBoundary) -> SubmitOutcome<T> {
        match result {
            Ok(saved) => {
                let message = match self.mode() {
                    DrawerMode::Create => "Record created",
                    DrawerMode::Edit(_) => "Record updated",
                    DrawerMode::Duplicate(_) => "Record duplicated",
                };
                boundary.notifier().success(message);
                self.close(true);
                SubmitOutcome::Saved(saved)
            }
            Err(err) => {
                if let Some(errors) = err.validation_errors() {
                    self.apply_validation_errors(errors.clone());
                    boundary.handle(&err);
                    return SubmitOutcome::Invalid;
                }
                SubmitOutcome::Failed(boundary.handle(&err))
            }
        }
    }

    pub fn mode(&self) -> DrawerMode {
        match (self.state.target_id, self.state.is_duplicate) {
            (None, _) => DrawerMode::Create,
            (Some(id), false) => DrawerMode::Edit(id),
            (Some(id), true) => DrawerMode::Duplicate(id),
        }
    }

    pub fn state(&self) -> DrawerState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut F {
        &mut self.form
    }

    pub fn field_error(&self, field: &str) -> Option<&[String]> {
        self.field_errors.get(field)
    }

    pub fn field_errors(&self) -> &ValidationErrors {
        &self.field_errors
    }

    pub fn bookmarks(&self) -> &[BookmarkState] {
        &self.bookmarks
    }

    pub fn active_bookmark(&self) -> Option<&str> {
        self.active_bookmark.as_deref()
    }

    /// 切换书签；不在表中的名字被忽略
    pub fn set_active_bookmark(&mut self, name: &str) -> bool {
        if !self.table.contains(name) {
            return false;
        }
        self.active_bookmark = Some(name.to_string());
        true
    }

    fn clear_errors(&mut self) {
        self.field_errors = ValidationErrors::default();
        for bookmark in &mut self.bookmarks {
            bookmark.has_error = false;
        }
    }
}
