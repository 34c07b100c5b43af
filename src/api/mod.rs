pub mod portrait_api;
