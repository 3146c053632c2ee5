use std::{mem, time::Duration};

use windows::Win32::{
    Foundation::FILETIME,
    System::{
        ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS},
        Threading::{GetCurrentProcess, GetProcessTimes},
    },
};

use crate::monitor::ProcessSampler;

/// Samples this process through `GetProcessTimes` and the working set size.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentProcessSampler;

fn filetime_to_duration(time: FILETIME) -> Duration {
    let ticks = (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime);
    // 100ns units
    Duration::from_nanos(ticks.saturating_mul(100))
}

impl ProcessSampler for CurrentProcessSampler {
    fn cpu_time(&mut self) -> Result<Duration, String> {
        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        unsafe {
            GetProcessTimes(GetCurrentProcess(), &mut creation, &mut exit, &mut kernel, &mut user)
                .map_err(|e| format!("GetProcessTimes failed: {e:?}"))?;
        }
        Ok(filetime_to_duration(kernel) + filetime_to_duration(user))
    }

    fn resident_bytes(&mut self) -> Result<u64, String> {
        let mut counters = PROCESS_MEMORY_COUNTERS::default();
        unsafe {
            GetProcessMemoryInfo(
                GetCurrentProcess(),
                &mut counters,
                mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32,
            )
            .map_err(|e| format!("GetProcessMemoryInfo failed: {e:?}"))?;
        }
        Ok(counters.WorkingSetSize as u64)
    }
}
