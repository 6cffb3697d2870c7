//! Resource routines, timers, the date and host-level system requests.

use chrono::{Datelike, Local, Timelike};
use log::{debug, info, warn};
use scumm_formats::parse_sound;
use serde::Serialize;

use super::{Halt, Vm, NUM_TIMERS};
use crate::error::{VmError, VmResult};
use crate::opcodes::subops::{classic, he100, he72};
use crate::opcodes::Dialect;
use crate::resource::{ResourceType, RF_USAGE};
use crate::vars::well_known;

/// Something a script asked of the host that the interpreter itself does
/// not carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemRequest {
    Restart,
    Pause,
    /// `confirm` when the game expects a confirmation dialog first.
    Quit { confirm: bool },
    FlushDrawQueue,
    UpdateScreen,
    StartExecutable { command: String },
    StartGame { name: String },
}

enum ResourceAction {
    Load,
    Nuke,
    Lock,
    Unlock,
}

impl Vm {
    /// Bring a resource into the cache. Missing data is reported through
    /// the operation failure variable rather than stopping the script.
    fn ensure_loaded(&mut self, kind: ResourceType, id: i32) {
        let failed = match self.resources.get(kind, id) {
            Ok(_) => false,
            Err(err) => {
                warn!("loading {kind:?} {id}: {err:#}");
                true
            }
        };
        self.vars
            .set_scalar(well_known::OPERATION_FAILURE, failed as i32);
    }

    fn apply_resource(&mut self, action: ResourceAction, kind: ResourceType, id: i32) {
        // room scripts cannot be pinned
        let room_script = kind == ResourceType::Script && id >= self.global_scripts;
        match action {
            ResourceAction::Load => self.ensure_loaded(kind, id),
            ResourceAction::Nuke if kind == ResourceType::Charset => self.resources.nuke(kind, id),
            ResourceAction::Nuke => self.resources.set_usage(kind, id, RF_USAGE),
            ResourceAction::Lock if !room_script => self.resources.lock(kind, id),
            ResourceAction::Unlock if !room_script => self.resources.unlock(kind, id),
            ResourceAction::Lock | ResourceAction::Unlock => {
                debug!("resourceRoutines: room script {id} left unlocked");
            }
        }
    }

    pub(super) fn resource_routines(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        match self.dialect {
            Dialect::He100 => self.he100_resource_routines(subop),
            _ => self.classic_resource_routines(subop),
        }
    }

    fn classic_resource_routines(&mut self, subop: i32) -> VmResult<()> {
        use ResourceAction::*;
        let (action, kind) = match subop {
            classic::RESOURCE_LOAD_SCRIPT => (Load, ResourceType::Script),
            classic::RESOURCE_LOAD_SOUND => (Load, ResourceType::Sound),
            classic::RESOURCE_LOAD_COSTUME => (Load, ResourceType::Costume),
            classic::RESOURCE_LOAD_ROOM => (Load, ResourceType::Room),
            classic::RESOURCE_NUKE_SCRIPT => (Nuke, ResourceType::Script),
            classic::RESOURCE_NUKE_SOUND => (Nuke, ResourceType::Sound),
            classic::RESOURCE_NUKE_COSTUME => (Nuke, ResourceType::Costume),
            classic::RESOURCE_NUKE_ROOM => (Nuke, ResourceType::Room),
            classic::RESOURCE_LOCK_SCRIPT => (Lock, ResourceType::Script),
            classic::RESOURCE_LOCK_SOUND => (Lock, ResourceType::Sound),
            classic::RESOURCE_LOCK_COSTUME => (Lock, ResourceType::Costume),
            classic::RESOURCE_LOCK_ROOM => (Lock, ResourceType::Room),
            classic::RESOURCE_UNLOCK_SCRIPT => (Unlock, ResourceType::Script),
            classic::RESOURCE_UNLOCK_SOUND => (Unlock, ResourceType::Sound),
            classic::RESOURCE_UNLOCK_COSTUME => (Unlock, ResourceType::Costume),
            classic::RESOURCE_UNLOCK_ROOM => (Unlock, ResourceType::Room),
            classic::RESOURCE_LOAD_CHARSET => (Load, ResourceType::Charset),
            classic::RESOURCE_NUKE_CHARSET => (Nuke, ResourceType::Charset),
            classic::RESOURCE_CLEAR_HEAP => {
                self.resources.clear_heap();
                return Ok(());
            }
            classic::RESOURCE_LOAD_OBJECT => {
                let object = self.pop()?;
                let room = self.pop()?;
                debug!("resourceRoutines: object {object} in room {room} ignored");
                return Ok(());
            }
            _ => {
                return Err(VmError::InvalidSubOp {
                    op: "resourceRoutines",
                    subop,
                })
            }
        };
        let id = self.pop()?;
        self.apply_resource(action, kind, id);
        Ok(())
    }

    fn he100_resource_routines(&mut self, subop: i32) -> VmResult<()> {
        let selected = match subop {
            he100::CHARSET_SET => Some(Some(ResourceType::Charset)),
            he100::COSTUME => Some(Some(ResourceType::Costume)),
            he100::FLOBJECT => Some(None),
            he100::IMAGE => Some(Some(ResourceType::Image)),
            he100::ROOM => Some(Some(ResourceType::Room)),
            he100::SCRIPT => Some(Some(ResourceType::Script)),
            he100::SOUND => Some(Some(ResourceType::Sound)),
            _ => None,
        };
        if let Some(kind) = selected {
            self.resource_kind = kind;
            self.resource_id = self.pop()?;
            return Ok(());
        }

        let action = match subop {
            he100::LOAD => ResourceAction::Load,
            he100::NUKE => ResourceAction::Nuke,
            he100::LOCK => ResourceAction::Lock,
            he100::UNLOCK => ResourceAction::Unlock,
            he100::CLEAR_HEAP => {
                self.resources.clear_heap();
                return Ok(());
            }
            he100::OFF_HEAP | he100::ON_HEAP | he100::PRELOAD | he100::PRELOAD_FLUSH => return Ok(()),
            _ => {
                return Err(VmError::InvalidSubOp {
                    op: "resourceRoutines",
                    subop,
                })
            }
        };
        match self.resource_kind {
            Some(kind) => self.apply_resource(action, kind, self.resource_id),
            None => debug!("resourceRoutines: object {} ignored", self.resource_id),
        }
        Ok(())
    }

    fn he100_resource_type(&self, op: &'static str, subop: i32) -> VmResult<ResourceType> {
        match subop {
            he100::COSTUME => Ok(ResourceType::Costume),
            he100::IMAGE => Ok(ResourceType::Image),
            he100::ROOM => Ok(ResourceType::Room),
            he100::SCRIPT => Ok(ResourceType::Script),
            he100::SOUND => Ok(ResourceType::Sound),
            _ => Err(VmError::InvalidSubOp { op, subop }),
        }
    }

    /// Resources are loaded synchronously, so this always reports 100%.
    pub(super) fn is_resource_loaded(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let id = self.pop()?;
        let kind = self.he100_resource_type("isResourceLoaded", subop)?;
        debug!("isResourceLoaded {kind:?} {id}");
        self.push(100)
    }

    pub(super) fn get_resource_size(&mut self) -> VmResult<()> {
        let id = self.pop()?;
        let kind = if self.version == 72 {
            ResourceType::Sound
        } else {
            let subop = self.fetch_subop()?;
            match self.dialect {
                Dialect::He100 => self.he100_resource_type("getResourceSize", subop)?,
                _ => match subop {
                    he72::SIZE_SOUND => ResourceType::Sound,
                    he72::SIZE_ROOM => ResourceType::Room,
                    he72::SIZE_IMAGE => ResourceType::Image,
                    he72::SIZE_COSTUME => ResourceType::Costume,
                    he72::SIZE_SCRIPT => ResourceType::Script,
                    _ => {
                        return Err(VmError::InvalidSubOp {
                            op: "getResourceSize",
                            subop,
                        })
                    }
                },
            }
        };
        let size = self.resource_size(kind, id)?;
        self.push(size)
    }

    /// Sounds report their sample data length, everything else its size
    /// in the cache.
    fn resource_size(&mut self, kind: ResourceType, id: i32) -> VmResult<i32> {
        let load_error = |err: anyhow::Error| VmError::ResourceLoad {
            kind,
            id,
            reason: format!("{err:#}"),
        };
        if kind == ResourceType::Sound {
            let data = self.resources.get(kind, id).map_err(load_error)?;
            let header = parse_sound(&data).map_err(|err| load_error(err.into()))?;
            return Ok(header.pcm(&data).len() as i32);
        }
        let size = self.resources.size(kind, id).map_err(load_error)?;
        Ok(size as i32)
    }

    fn timer_index(timer: i32) -> VmResult<usize> {
        match usize::try_from(timer) {
            Ok(index) if (1..=NUM_TIMERS).contains(&index) => Ok(index),
            _ => Err(VmError::InvalidTimer(timer)),
        }
    }

    fn clock_ms(&self) -> u64 {
        self.clock_us / 1000
    }

    pub(super) fn get_timer(&mut self) -> VmResult<()> {
        let timer = self.pop()?;
        let command = self.fetch_subop()?;
        if command == he72::TIMER_GET || command == he72::TIMER_GET_ALT {
            let index = Self::timer_index(timer)?;
            let elapsed = self.clock_ms().saturating_sub(self.timers[index]);
            self.push(elapsed.min(i32::MAX as u64) as i32)
        } else {
            self.push(0)
        }
    }

    pub(super) fn set_timer(&mut self) -> VmResult<()> {
        let timer = self.pop()?;
        let command = self.fetch_subop()?;
        if command != he72::TIMER_RESET && command != he72::TIMER_RESET_ALT {
            return Err(VmError::InvalidSubOp {
                op: "setTimer",
                subop: command,
            });
        }
        let index = Self::timer_index(timer)?;
        self.timers[index] = self.clock_ms();
        Ok(())
    }

    /// Wall-clock date in `struct tm` conventions: years since 1900 and
    /// zero-based months.
    pub(super) fn get_date_time(&mut self) -> VmResult<()> {
        let now = Local::now();
        let fields = [
            (well_known::TIMEDATE_YEAR, now.year() - 1900),
            (well_known::TIMEDATE_MONTH, now.month0() as i32),
            (well_known::TIMEDATE_DAY, now.day() as i32),
            (well_known::TIMEDATE_HOUR, now.hour() as i32),
            (well_known::TIMEDATE_MINUTE, now.minute() as i32),
            (well_known::TIMEDATE_SECOND, now.second() as i32),
        ];
        for (var, value) in fields {
            self.vars.set_scalar(var, value);
        }
        Ok(())
    }

    pub(super) fn system_ops(&mut self) -> VmResult<()> {
        let subop = self.fetch_subop()?;
        let request = match self.dialect {
            Dialect::Classic => match subop {
                classic::SYSTEM_RESTART => SystemRequest::Restart,
                classic::SYSTEM_PAUSE => SystemRequest::Pause,
                classic::SYSTEM_QUIT => SystemRequest::Quit { confirm: false },
                _ => return Err(VmError::InvalidSubOp { op: "systemOps", subop }),
            },
            Dialect::He72 => match subop {
                he72::SYSTEM_FLUSH_DRAW_QUEUE => SystemRequest::FlushDrawQueue,
                he72::SYSTEM_RESTART => SystemRequest::Restart,
                he72::SYSTEM_QUIT => SystemRequest::Quit { confirm: true },
                he72::SYSTEM_QUIT_QUIT => SystemRequest::Quit { confirm: false },
                he72::SYSTEM_START_STRING => SystemRequest::StartExecutable {
                    command: self.pop_lossy_string()?,
                },
                he72::SYSTEM_RESTART_STRING => SystemRequest::StartGame {
                    name: self.pop_lossy_string()?,
                },
                _ => return Err(VmError::InvalidSubOp { op: "systemOps", subop }),
            },
            Dialect::He100 => match subop {
                he100::RESTART => SystemRequest::Restart,
                he100::FLUSH_OBJECT_DRAW_QUEUE => SystemRequest::FlushDrawQueue,
                he100::QUIT => SystemRequest::Quit { confirm: true },
                he100::QUIT_QUIT => SystemRequest::Quit { confirm: false },
                he100::RESTART_STRING => SystemRequest::StartGame {
                    name: self.pop_lossy_string()?,
                },
                he100::START_SYSTEM_STRING => SystemRequest::StartExecutable {
                    command: self.pop_lossy_string()?,
                },
                he100::UPDATE_SCREEN => SystemRequest::UpdateScreen,
                _ => return Err(VmError::InvalidSubOp { op: "systemOps", subop }),
            },
        };
        self.host_request(request);
        Ok(())
    }

    fn pop_lossy_string(&mut self) -> VmResult<String> {
        let bytes = self.pop_script_string()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn host_request(&mut self, request: SystemRequest) {
        info!("system request: {request:?}");
        let halt = match request {
            SystemRequest::Restart => Some(Halt::Restart),
            SystemRequest::Quit { .. } => Some(Halt::Quit),
            _ => None,
        };
        if let Some(halt) = halt {
            self.halt = Some(halt);
            self.yield_slot();
        }
        self.requests.push(request);
    }
}
