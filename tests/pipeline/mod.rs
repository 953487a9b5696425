mod fanout_tests;
mod redelivery_tests;
mod sequential_tests;
