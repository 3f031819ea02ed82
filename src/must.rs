//! Panicking counterparts of the fallible accessors, for call sites where an
//! error is a bug (tests, seed scripts). Enabled by the `must` feature.

use crate::{
    builder::{Create, Query},
    client::EntityClient,
    context::Context,
    entity::Entity,
};

impl<E: Entity> EntityClient<E> {
    pub fn get_x(&self, ctx: &Context, id: i64) -> E {
        self.get(ctx, id).unwrap_or_else(|err| panic!("get {id}: {err}"))
    }
}

impl<E: Entity> Query<E> {
    pub fn all_x(self, ctx: &Context) -> Vec<E> {
        self.all(ctx).unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn only_x(self, ctx: &Context) -> E {
        self.only(ctx).unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn first_x(self, ctx: &Context) -> E {
        self.first(ctx).unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn count_x(self, ctx: &Context) -> usize {
        self.count(ctx).unwrap_or_else(|err| panic!("{err}"))
    }
}

impl<E: Entity> Create<E> {
    pub fn save_x(self, ctx: &Context) -> E {
        self.save(ctx).unwrap_or_else(|err| panic!("{err}"))
    }
}
