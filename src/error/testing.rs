#[cfg(test)]
/// # Panics
/// Panics if the result is `Ok` (operation succeeded when error was expected).
pub fn assert_error_class<T>(
    result: crate::SchedulerResult<T>,
    expected_class: &str,
) {
    match result {
        Err(e) => {
            assert_eq!(
                e.class(),
                expected_class,
                "Expected error class {expected_class}, got {}: {e}",
                e.class()
            );
        }
        Ok(_) => {
            panic!("Expected error of class {expected_class}, but operation succeeded");
        }
    }
}

#[cfg(test)]
/// # Panics
/// Panics if the result is `Ok` (operation succeeded when error was expected).
pub fn assert_error_contains<T>(
    result: crate::SchedulerResult<T>,
    expected_substring: &str,
) {
    match result {
        Err(e) => {
            let message = e.to_string();
            assert!(
                message.contains(expected_substring),
                "Error message '{message}' does not contain '{expected_substring}'"
            );
        }
        Ok(_) => {
            panic!("Expected error containing '{expected_substring}', but operation succeeded");
        }
    }
}
