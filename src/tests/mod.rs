mod helpers;
mod incremental;
