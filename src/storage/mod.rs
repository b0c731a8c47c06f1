pub mod durable;
pub mod freelist;
pub mod mem_store;
pub mod page;
pub mod page_store;
