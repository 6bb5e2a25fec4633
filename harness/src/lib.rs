pub mod config;
pub mod notifier;
pub mod parser;
pub mod result;
pub mod runner;
pub mod suite;

pub use config::{
    split_list, ConfigError, ConfigResult, DrivePolicy, HarnessConfig, LtpConfig, ReportConfig,
    SuiteConfig,
};
pub use notifier::{
    print_results, CollectingNotifier, ConsoleNotifier, LogNotifier, Notifier, NotifierError,
    NotifierHub, NotifierResult, TestResultMessage, TextResultNotifier,
};
pub use parser::{parse_status, ParseError, ParseResult, ResultParser};
pub use result::{failed_test_names, LtpResult, TestStatus};
pub use runner::{build_arguments, skip_file_content, InvocationMode, LtpError, LtpRunner, RunResult};
pub use suite::{
    check_failures, LtpLiteSuite, SuiteError, SuiteResult, SuiteVariables, LTP_LITE_TESTS,
    SUITE_NAME,
};
