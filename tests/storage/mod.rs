mod async_writer_tests;
