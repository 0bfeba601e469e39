pub mod async_writer;
