//! Ordered request-mutation steps applied before every send.

// self
use crate::{
	_prelude::*,
	error::InjectorError,
	http::{ApiRequest, HeaderMap, HeaderName, HeaderValue, header},
	store::{ContextStore, TokenStore},
};

/// Boxed future returned by [`Injector::mutate`].
pub type InjectorFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiRequest>> + 'a + Send>>;

/// One step of request decoration.
///
/// Injectors hold no per-call state; the pipeline runs them in their declared order on a fresh
/// copy of the caller's template for every send, so values fetched from the stores are always
/// current. A failure aborts the attempt before anything reaches the transport.
pub trait Injector
where
	Self: Send + Sync,
{
	/// Stable label used in traces.
	fn name(&self) -> &'static str;

	/// Returns `request` with this step's contribution applied.
	fn mutate(&self, request: ApiRequest) -> InjectorFuture<'_>;
}

/// Points every request at the configured scheme, host, and port.
#[derive(Clone, Debug)]
pub struct HostInjector {
	base: Url,
}
impl HostInjector {
	/// Rewrites requests onto `base`.
	pub fn new(base: Url) -> Self {
		Self { base }
	}

	fn rewrite(&self, mut request: ApiRequest) -> Result<ApiRequest, InjectorError> {
		let mut url = request.url.clone();
		let rewritten = !url.cannot_be_a_base()
			&& url.set_scheme(self.base.scheme()).is_ok()
			&& url.set_host(self.base.host_str()).is_ok()
			&& url.set_port(self.base.port()).is_ok();

		if !rewritten {
			return Err(InjectorError::HostRewrite { url: request.url.to_string() });
		}

		request.url = url;

		Ok(request)
	}
}
impl Injector for HostInjector {
	fn name(&self) -> &'static str {
		"host"
	}

	fn mutate(&self, request: ApiRequest) -> InjectorFuture<'_> {
		let result = self.rewrite(request).map_err(Error::from);

		Box::pin(async move { result })
	}
}

/// Adds the static header set; headers already on the template are left alone.
#[derive(Clone, Debug)]
pub struct HeaderInjector {
	headers: HeaderMap,
}
impl HeaderInjector {
	/// Adds `headers` to every request.
	pub fn new(headers: HeaderMap) -> Self {
		Self { headers }
	}
}
impl Injector for HeaderInjector {
	fn name(&self) -> &'static str {
		"header"
	}

	fn mutate(&self, mut request: ApiRequest) -> InjectorFuture<'_> {
		for (name, value) in &self.headers {
			request.headers.entry(name).or_insert_with(|| value.clone());
		}

		Box::pin(async move { Ok(request) })
	}
}

/// Attaches the account context fetched from a [`ContextStore`].
#[derive(Debug)]
pub struct ContextInjector {
	store: Arc<ContextStore>,
	header: HeaderName,
}
impl ContextInjector {
	/// Attaches values from `store` under `header`.
	pub fn new(store: Arc<ContextStore>, header: HeaderName) -> Self {
		Self { store, header }
	}
}
impl Injector for ContextInjector {
	fn name(&self) -> &'static str {
		"context"
	}

	fn mutate(&self, mut request: ApiRequest) -> InjectorFuture<'_> {
		Box::pin(async move {
			let context = self.store.fetch().await?;
			let value = HeaderValue::from_str(context.value()).map_err(|_| {
				InjectorError::InvalidHeaderValue { name: self.header.as_str().to_owned() }
			})?;

			request.headers.insert(self.header.clone(), value);

			Ok(request)
		})
	}
}

/// Attaches `Authorization: Bearer <credential>` from a [`TokenStore`].
#[derive(Debug)]
pub struct AuthInjector {
	store: Arc<TokenStore>,
}
impl AuthInjector {
	/// Attaches credentials from `store`.
	pub fn new(store: Arc<TokenStore>) -> Self {
		Self { store }
	}
}
impl Injector for AuthInjector {
	fn name(&self) -> &'static str {
		"auth"
	}

	fn mutate(&self, mut request: ApiRequest) -> InjectorFuture<'_> {
		Box::pin(async move {
			let credential = self.store.fetch().await?;
			let name = header::AUTHORIZATION;
			let mut value = HeaderValue::try_from(credential.bearer())
				.map_err(|_| InjectorError::InvalidHeaderValue { name: name.as_str().to_owned() })?;

			value.set_sensitive(true);
			request.headers.insert(name, value);

			Ok(request)
		})
	}
}
