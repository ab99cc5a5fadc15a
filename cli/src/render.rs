use owo_colors::OwoColorize;
use queuectl_state::Job;
use queuectl_state::JobState;
use queuectl_state::JobStats;
use queuectl_state::format_utc;

pub(crate) fn print_jobs_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs found.");
        return;
    }

    println!(
        "{:<24} {:<12} {:>8}  {:<27} {:<27} {}",
        "ID", "STATE", "ATTEMPTS", "CREATED", "UPDATED", "WORKER"
    );
    for job in jobs {
        let attempts = format!("{}/{}", job.attempts, job.max_retries);
        println!(
            "{:<24} {} {:>8}  {:<27} {:<27} {}",
            job.id,
            state_cell(job.state),
            attempts,
            format_utc(job.created_at),
            format_utc(job.updated_at),
            job.worker_id.as_deref().unwrap_or("-"),
        );
    }
}

pub(crate) fn print_status(stats: &JobStats, active_workers: usize) {
    println!("Jobs:");
    for (state, count) in [
        (JobState::Pending, stats.pending),
        (JobState::Processing, stats.processing),
        (JobState::Completed, stats.completed),
        (JobState::Failed, stats.failed),
        (JobState::Dead, stats.dead),
    ] {
        println!("  {} {count}", state_cell(state));
    }
    println!("Active workers: {active_workers}");
}

/// State label padded before coloring, so ANSI escapes do not skew the
/// column widths.
fn state_cell(state: JobState) -> String {
    let padded = format!("{:<12}", state.as_str());
    match state {
        JobState::Pending => padded.yellow().to_string(),
        JobState::Processing => padded.cyan().to_string(),
        JobState::Completed => padded.green().to_string(),
        JobState::Failed => padded.red().to_string(),
        JobState::Dead => padded.red().bold().to_string(),
    }
}
