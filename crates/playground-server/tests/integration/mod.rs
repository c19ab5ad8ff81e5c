mod api_tests;
mod git_tests;
