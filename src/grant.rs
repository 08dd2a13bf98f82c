//! Routing grants and the identifiers they hang off
use super::error::ValidationError;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

pub type TransactionId = u64;
pub type SubModuleId = u64;
pub type VesselId = u64;
pub type UserId = u64;
pub type DirectorateId = u64;

/// Identifies one approval chain: a domain record of a given form type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub struct ChainKey {
    #[n(0)]
    pub transaction_id: TransactionId,
    #[n(1)]
    pub sub_module: SubModuleId,
}

impl ChainKey {
    pub fn new(transaction_id: TransactionId, sub_module: SubModuleId) -> Self {
        Self {
            transaction_id,
            sub_module,
        }
    }
    /// Store key. Big-endian so chains of one transaction sort together.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&self.transaction_id.to_be_bytes());
        key[8..].copy_from_slice(&self.sub_module.to_be_bytes());
        key
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction {}/sub-module {}",
            self.transaction_id, self.sub_module
        )
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Access level carried by a grant. Ordered `View < Comment < Edit`.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash,
)]
pub enum PermissionType {
    #[n(0)]
    View,
    #[n(1)]
    Comment,
    #[n(2)]
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteType {
    Internal,
    External,
}

/// Who a grant routes the transaction to.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Route {
    #[n(0)]
    Internal {
        #[n(0)]
        user: UserId,
        #[n(1)]
        directorate: Option<DirectorateId>, // acting unit that issued the grant
        #[n(2)]
        permission: PermissionType,
        #[n(3)]
        is_approver: bool,
    },
    #[n(1)]
    External {
        #[n(0)]
        directorate: DirectorateId,
        #[n(1)]
        permission: PermissionType,
    },
}

impl Route {
    pub fn route_type(&self) -> RouteType {
        match self {
            Route::Internal { .. } => RouteType::Internal,
            Route::External { .. } => RouteType::External,
        }
    }
    pub fn permission(&self) -> PermissionType {
        match self {
            Route::Internal { permission, .. } | Route::External { permission, .. } => *permission,
        }
    }
    /// Same actor and same permission, the tuple the duplicate guard keys on.
    pub fn same_assignment(&self, other: &Route) -> bool {
        match (self, other) {
            (
                Route::Internal {
                    user: a,
                    permission: pa,
                    ..
                },
                Route::Internal {
                    user: b,
                    permission: pb,
                    ..
                },
            ) => a == b && pa == pb,
            (
                Route::External {
                    directorate: a,
                    permission: pa,
                },
                Route::External {
                    directorate: b,
                    permission: pb,
                },
            ) => a == b && pa == pb,
            _ => false,
        }
    }
}

/// A persisted entry of an approval chain.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RoutingGrant {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub transaction_id: TransactionId,
    #[n(2)]
    pub sub_module: SubModuleId,
    #[n(3)]
    pub vessel_id: VesselId,
    #[n(4)]
    pub route: Route,
    #[n(5)]
    pub is_granted: bool,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub sequence: u64, // position in the chain log, shared with approval events
}

impl RoutingGrant {
    pub fn key(&self) -> ChainKey {
        ChainKey::new(self.transaction_id, self.sub_module)
    }
}

/// A grant that passed validation and is ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGrant {
    pub key: ChainKey,
    pub vessel_id: VesselId,
    pub route: Route,
    pub is_granted: bool,
}

// Draft of a grant as a form submits it. Every field is optional until validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    route_type: RouteType,
    transaction_id: Option<TransactionId>,
    sub_module: Option<SubModuleId>,
    vessel_id: Option<VesselId>,
    user: Option<UserId>,
    directorate: Option<DirectorateId>,
    permission: Option<PermissionType>,
    is_granted: Option<bool>,
    is_approver: Option<bool>,
}

impl GrantRequest {
    pub fn new(route_type: RouteType) -> Self {
        Self {
            route_type,
            transaction_id: None,
            sub_module: None,
            vessel_id: None,
            user: None,
            directorate: None,
            permission: None,
            is_granted: None,
            is_approver: None,
        }
    }
    pub fn internal() -> Self {
        Self::new(RouteType::Internal)
    }
    pub fn external() -> Self {
        Self::new(RouteType::External)
    }
    pub fn set_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
    pub fn set_sub_module(mut self, sub_module: SubModuleId) -> Self {
        self.sub_module = Some(sub_module);
        self
    }
    pub fn set_vessel(mut self, vessel_id: VesselId) -> Self {
        self.vessel_id = Some(vessel_id);
        self
    }
    pub fn set_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }
    pub fn set_directorate(mut self, directorate: DirectorateId) -> Self {
        self.directorate = Some(directorate);
        self
    }
    pub fn set_permission(mut self, permission: PermissionType) -> Self {
        self.permission = Some(permission);
        self
    }
    pub fn set_granted(mut self, is_granted: bool) -> Self {
        self.is_granted = Some(is_granted);
        self
    }
    pub fn set_approver(mut self, is_approver: bool) -> Self {
        self.is_approver = Some(is_approver);
        self
    }
    pub fn route_type(&self) -> RouteType {
        self.route_type
    }

    /// Checks the fields required by the route type and builds the tagged route.
    /// `acting_directorate` is the unit issuing the grant; internal routes record it.
    pub fn validate_and_finalise(
        &self,
        acting_directorate: Option<DirectorateId>,
    ) -> Result<NewGrant, ValidationError> {
        let transaction_id = self
            .transaction_id
            .ok_or(ValidationError::MissingField("transactionId"))?;
        let sub_module = self
            .sub_module
            .ok_or(ValidationError::MissingField("subModule"))?;
        let vessel_id = self
            .vessel_id
            .ok_or(ValidationError::MissingField("vesselId"))?;

        let route = match self.route_type {
            RouteType::Internal => {
                if self.directorate.is_some() {
                    return Err(self.unexpected("directorate"));
                }
                let user = self.user.ok_or(ValidationError::MissingField("user"))?;
                let permission = self
                    .permission
                    .ok_or(ValidationError::MissingField("permissionType"))?;

                Route::Internal {
                    user,
                    directorate: acting_directorate,
                    permission,
                    is_approver: self.is_approver.unwrap_or(false),
                }
            }
            RouteType::External => {
                if self.user.is_some() {
                    return Err(self.unexpected("user"));
                }
                if self.is_approver.is_some() {
                    return Err(self.unexpected("isApprover"));
                }
                let directorate = self
                    .directorate
                    .ok_or(ValidationError::MissingField("directorate"))?;

                Route::External {
                    directorate,
                    permission: self.permission.unwrap_or(PermissionType::View),
                }
            }
        };

        Ok(NewGrant {
            key: ChainKey::new(transaction_id, sub_module),
            vessel_id,
            route,
            is_granted: self.is_granted.unwrap_or(true),
        })
    }

    fn unexpected(&self, field: &'static str) -> ValidationError {
        ValidationError::UnexpectedField {
            field,
            route_type: self.route_type,
        }
    }
}
