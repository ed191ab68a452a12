pub(crate) mod connections;
pub(crate) mod inspect;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod serve;
pub(crate) mod shared;
pub(crate) mod sync;
