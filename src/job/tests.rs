// proclet: embeddable child-process execution
//
// SPDX-FileCopyrightText: 2026 proclet contributors
// SPDX-License-Identifier: MIT

use super::JobObject;

#[test]
fn test_job_object_creation() {
    assert!(JobObject::new(false).is_ok());
    assert!(JobObject::new(true).is_ok());
}

#[test]
fn test_assign_invalid_pid_fails() {
    let job = JobObject::new(false).expect("job creation should succeed");
    // Pid 0 is the idle process; it can never be opened for assignment.
    assert!(job.assign_pid(0).is_err());
}
