use std::{ffi::c_void, io, os::windows::process::CommandExt, path::Path, process::Command};

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS},
        System::Registry::{RegGetValueW, HKEY_CURRENT_USER, RRF_RT_REG_SZ},
    },
};

use crate::{
    autostart::{RunKeyReader, ScriptRunner, RUN_KEY},
    debug,
    utility::to_wstring,
};

const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Reads values under `HKCU\Software\Microsoft\Windows\CurrentVersion\Run`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HkcuRunKey;

impl RunKeyReader for HkcuRunKey {
    fn read(&self, value_name: &str) -> Result<Option<String>, String> {
        let key = to_wstring(RUN_KEY);
        let name = to_wstring(value_name);

        let mut size = 0u32;
        let status = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                PCWSTR(key.as_ptr()),
                PCWSTR(name.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                None,
                Some(&mut size as *mut u32),
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != ERROR_SUCCESS {
            return Err(format!("RegGetValueW(size) failed: {status:?}"));
        }

        let mut buffer = vec![0u16; (size as usize).div_ceil(2)];
        let status = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                PCWSTR(key.as_ptr()),
                PCWSTR(name.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr() as *mut c_void),
                Some(&mut size as *mut u32),
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != ERROR_SUCCESS {
            return Err(format!("RegGetValueW failed: {status:?}"));
        }

        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        Ok(Some(String::from_utf16_lossy(&buffer[..len])))
    }
}

/// Runs batch scripts through `cmd /C` without a console window.
#[derive(Debug, Default, Clone, Copy)]
pub struct CmdScriptRunner;

impl ScriptRunner for CmdScriptRunner {
    fn launch(&self, script: &Path) -> io::Result<()> {
        let child = Command::new("cmd")
            .arg("/C")
            .arg(script)
            .creation_flags(CREATE_NO_WINDOW)
            .spawn()?;
        debug!("[AUTOSTART] launched {} as pid {}", script.display(), child.id());
        Ok(())
    }
}
