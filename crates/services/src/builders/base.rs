//! Fluent, lazily executed query composition shared by the domain builders.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use domains::{Entity, QueryExecutor, QuerySpec, Result};
use futures_util::future::BoxFuture;
use uuid::Uuid;

/// Accumulates a [`QuerySpec`] and resolves it through a [`QueryExecutor`].
///
/// Nothing touches the store until the builder is awaited or a terminal
/// (`count`, `sum`, `first`) is awaited.
pub struct BaseBuilder<E: Entity> {
    spec: QuerySpec<E>,
    executor: Arc<dyn QueryExecutor<E>>,
}

impl<E: Entity> BaseBuilder<E> {
    pub fn new(executor: Arc<dyn QueryExecutor<E>>) -> Self {
        Self {
            spec: QuerySpec::default(),
            executor,
        }
    }

    pub fn spec(&self) -> &QuerySpec<E> {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut QuerySpec<E> {
        &mut self.spec
    }

    pub async fn get(self) -> Result<Vec<E::Record>> {
        self.executor.fetch(&self.spec).await
    }

    pub async fn first(mut self) -> Result<Option<E::Record>> {
        self.spec.limit(1);
        Ok(self.executor.fetch(&self.spec).await?.into_iter().next())
    }

    pub async fn count(self, column: Option<E::Column>) -> Result<i64> {
        self.executor.count(&self.spec, column).await
    }

    pub async fn sum(self, column: E::Column) -> Result<i64> {
        self.executor.sum(&self.spec, column).await
    }
}

impl<E: Entity> IntoFuture for BaseBuilder<E> {
    type Output = Result<Vec<E::Record>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.get())
    }
}

/// Chainable operations available on every builder.
///
/// Every mutator takes the builder by value and hands it back, so calls
/// compose left-to-right: `builder.root().when(flag, |b| b.limit(4))`.
pub trait QueryBuilder: Sized + Send {
    type Entity: Entity;

    fn base(&self) -> &BaseBuilder<Self::Entity>;
    fn base_mut(&mut self) -> &mut BaseBuilder<Self::Entity>;
    fn into_base(self) -> BaseBuilder<Self::Entity>;

    fn spec(&self) -> &QuerySpec<Self::Entity> {
        self.base().spec()
    }

    /// Applies `f` only when `condition` holds.
    fn when(self, condition: bool, f: impl FnOnce(Self) -> Self) -> Self {
        if condition {
            f(self)
        } else {
            self
        }
    }

    /// Applies `f` with the contained value when there is one.
    fn when_some<T>(self, value: Option<T>, f: impl FnOnce(Self, T) -> Self) -> Self {
        match value {
            Some(value) => f(self, value),
            None => self,
        }
    }

    fn limit(mut self, limit: usize) -> Self {
        self.base_mut().spec_mut().limit(limit);
        self
    }

    /// Excludes rows whose primary key is in `ids`.
    fn exclude(self, ids: Vec<Uuid>) -> Self {
        self.exclude_on(ids, <Self::Entity as Entity>::ID_COLUMN)
    }

    fn exclude_on(mut self, values: Vec<Uuid>, column: <Self::Entity as Entity>::Column) -> Self {
        if !values.is_empty() {
            self.base_mut().spec_mut().exclude(column, values);
        }
        self
    }

    fn count(
        self,
        column: Option<<Self::Entity as Entity>::Column>,
    ) -> impl Future<Output = Result<i64>> + Send {
        self.into_base().count(column)
    }

    fn sum(self, column: <Self::Entity as Entity>::Column) -> impl Future<Output = Result<i64>> + Send {
        self.into_base().sum(column)
    }

    fn first(self) -> impl Future<Output = Result<Option<<Self::Entity as Entity>::Record>>> + Send {
        self.into_base().first()
    }

    fn get(self) -> impl Future<Output = Result<Vec<<Self::Entity as Entity>::Record>>> + Send {
        self.into_base().get()
    }
}

impl<E: Entity> QueryBuilder for BaseBuilder<E> {
    type Entity = E;

    fn base(&self) -> &BaseBuilder<E> {
        self
    }

    fn base_mut(&mut self) -> &mut BaseBuilder<E> {
        self
    }

    fn into_base(self) -> BaseBuilder<E> {
        self
    }
}
